use anyhow::{anyhow, Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::StreamExt;
use tracing::{debug, info};

use super::{ImageAnalyzer, PageImage, TextStream, TextSummarizer, PAGE_PROMPT};
use crate::config::GenerationConfig;

fn build_client(config: &GenerationConfig) -> Result<Client<OpenAIConfig>> {
    let api_key = config
        .load_api_key()
        .context("Failed to load OpenAI API key")?;

    let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
    if let Some(base_url) = &config.base_url {
        openai_config = openai_config.with_api_base(base_url);
    }
    Ok(Client::with_config(openai_config))
}

async fn stream_chat(
    client: &Client<OpenAIConfig>,
    model: &str,
    max_tokens: u32,
    messages: Vec<ChatCompletionRequestMessage>,
) -> Result<TextStream> {
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .max_tokens(max_tokens)
        .messages(messages)
        .stream(true)
        .build()
        .context("Failed to build chat completion request")?;

    let stream = client
        .chat()
        .create_stream(request)
        .await
        .context("Chat completion request failed")?;

    let text = stream.filter_map(|item| async move {
        match item {
            Ok(response) => response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())
                .map(Ok),
            Err(e) => Some(Err(anyhow!("stream interrupted: {}", e))),
        }
    });

    Ok(Box::pin(text))
}

/// Vision model client describing page images
pub struct OpenAIAnalyzer {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl OpenAIAnalyzer {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        info!("Initialized vision model: {}", config.vision_model);
        Ok(Self {
            client: build_client(config)?,
            model: config.vision_model.clone(),
            max_tokens: config.vision_max_tokens,
        })
    }
}

#[async_trait]
impl ImageAnalyzer for OpenAIAnalyzer {
    async fn analyze(&self, page: &PageImage) -> Result<TextStream> {
        debug!(page = %page.name, bytes = page.bytes.len(), "Requesting page analysis");

        let data_url = format!("data:{};base64,{}", page.mime, STANDARD.encode(&page.bytes));

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(vec![
                ChatCompletionRequestMessageContentPartTextArgs::default()
                    .text(PAGE_PROMPT)
                    .build()?
                    .into(),
                ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(ImageUrlArgs::default().url(data_url).build()?)
                    .build()?
                    .into(),
            ])
            .build()?;

        stream_chat(&self.client, &self.model, self.max_tokens, vec![message.into()]).await
    }
}

/// Chat model client writing chapter digests
pub struct OpenAISummarizer {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl OpenAISummarizer {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        info!("Initialized summary model: {}", config.summary_model);
        Ok(Self {
            client: build_client(config)?,
            model: config.summary_model.clone(),
            max_tokens: config.summary_max_tokens,
        })
    }
}

#[async_trait]
impl TextSummarizer for OpenAISummarizer {
    async fn summarize(&self, system: &str, text: &str) -> Result<TextStream> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(text)
                .build()?
                .into(),
        ];

        stream_chat(&self.client, &self.model, self.max_tokens, messages).await
    }
}
