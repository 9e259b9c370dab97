use anyhow::Result;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use comicrag::generation::mock::ScriptedAnalyzer;
use comicrag::live::{PushMessage, StreamPublisher};
use comicrag::tasks::JobProcessor;

use crate::helpers::fixtures::comic_zip;
use crate::helpers::test_harness::TestHarness;

async fn collect(publisher: &StreamPublisher, task_id: &str) -> Vec<PushMessage> {
    let stream = publisher.subscribe(task_id);
    tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>())
        .await
        .expect("subscription did not close")
}

#[tokio::test]
async fn test_live_subscriber_sees_every_stream_in_full() -> Result<()> {
    let analyzer = ScriptedAnalyzer::new().with_chunk_delay(Duration::from_millis(2));
    let mut harness = TestHarness::with_analyzer(Arc::new(analyzer));
    harness.config.stream.replay_finished_streams = true;

    let task_id = harness.submit(
        "duo.zip",
        &comic_zip(&["Duo/ch1/1.png", "Duo/ch1/2.png", "Duo/ch2/1.png"]),
        None,
    );
    let publisher = StreamPublisher::new(harness.store.clone(), &harness.config.stream);
    let subscriber = {
        let publisher = publisher.clone();
        let task_id = task_id.clone();
        tokio::spawn(async move { collect(&publisher, &task_id).await })
    };

    let job = harness.queue.pop().unwrap();
    harness.processor().process(job).await?;
    let messages = subscriber.await?;

    assert_eq!(messages.last(), Some(&PushMessage::Close));

    let mut received: BTreeMap<String, String> = BTreeMap::new();
    let mut ended = Vec::new();
    for message in &messages {
        match message {
            PushMessage::History { stream_id, content }
            | PushMessage::Content { stream_id, content } => {
                received.entry(stream_id.clone()).or_default().push_str(content);
            }
            PushMessage::StreamEnd { stream_id, error } => {
                assert!(!error);
                ended.push(stream_id.clone());
            }
            PushMessage::Close => {}
        }
    }

    let buffers = harness.store.snapshot_streams(&task_id).unwrap();
    assert_eq!(received.len(), buffers.len());
    for (id, buffer) in &buffers {
        assert_eq!(received[id], buffer.text(), "stream {}", id);
    }
    assert!(received["ch1_1"].contains("description of 1.png"));
    assert!(received.contains_key("summary_ch2"));
    Ok(())
}

#[tokio::test]
async fn test_late_subscriber_skips_finished_streams_by_default() -> Result<()> {
    let harness = TestHarness::new();
    let task_id = harness.submit("solo.zip", &comic_zip(&["Solo/1.png"]), None);
    let job = harness.queue.pop().unwrap();
    harness.processor().process(job).await?;

    let publisher = StreamPublisher::new(harness.store.clone(), &harness.config.stream);
    assert_eq!(collect(&publisher, &task_id).await, vec![PushMessage::Close]);
    Ok(())
}

#[tokio::test]
async fn test_late_subscriber_replays_finished_streams_when_enabled() -> Result<()> {
    let mut harness = TestHarness::new();
    harness.config.stream.replay_finished_streams = true;
    let task_id = harness.submit(
        "pair.zip",
        &comic_zip(&["Pair/ch2/1.png", "Pair/ch10/1.png"]),
        None,
    );
    let job = harness.queue.pop().unwrap();
    harness.processor().process(job).await?;

    let publisher = StreamPublisher::new(harness.store.clone(), &harness.config.stream);
    let messages = collect(&publisher, &task_id).await;

    let ids: Vec<&str> = messages
        .iter()
        .filter_map(|m| match m {
            PushMessage::History { stream_id, .. } => Some(stream_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["ch2_1", "ch10_1", "summary_ch2", "summary_ch10"]);
    assert_eq!(messages.last(), Some(&PushMessage::Close));
    Ok(())
}

#[tokio::test]
async fn test_unknown_task_gets_error_then_close() {
    let harness = TestHarness::new();
    let publisher = StreamPublisher::new(harness.store.clone(), &harness.config.stream);

    let messages = collect(&publisher, "missing").await;
    assert_eq!(messages.len(), 2);
    assert!(matches!(&messages[0], PushMessage::Content { stream_id, .. } if stream_id == "error"));
    assert_eq!(messages[1], PushMessage::Close);
}
