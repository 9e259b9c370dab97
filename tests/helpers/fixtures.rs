use image::{ImageBuffer, ImageFormat, Rgb};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

/// A small solid-color PNG
pub fn png_bytes(shade: u8) -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_pixel(4, 4, Rgb([shade, 0, 255 - shade]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Zip with a PNG at every given path
pub fn comic_zip(pages: &[&str]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (i, page) in pages.iter().enumerate() {
        zip.start_file(*page, SimpleFileOptions::default()).unwrap();
        zip.write_all(&png_bytes(i as u8 * 20)).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Zip holding only non-image files
pub fn text_only_zip() -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("notes.txt", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"no pictures here").unwrap();
    zip.finish().unwrap().into_inner()
}
