//! Async wrappers.
//!
//! Codec calls are synchronous and CPU-heavy, so from async code they are
//! dispatched onto tokio's blocking pool with
//! [`tokio::task::spawn_blocking`].

use std::sync::Arc;

use crate::codec::Codec;
use crate::decode::Decoded;
use crate::error::{CodecError, Result};
use crate::geometry::ImageDescriptor;
use crate::options::{DecodingOptions, EncodingOptions};
use crate::raster::Image;

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CodecError::Join(format!("blocking codec task failed: {e}")))?
}

/// Probe `data` for its metadata without blocking the reactor.
pub async fn describe_async(codec: Arc<Codec>, data: Vec<u8>) -> Result<ImageDescriptor> {
    blocking(move || codec.describe(data.as_slice())).await
}

/// Decode `data` on the blocking pool.
pub async fn decode_async(codec: Arc<Codec>, data: Vec<u8>, opts: DecodingOptions) -> Result<Decoded> {
    blocking(move || codec.decode_bytes(&data, &opts)).await
}

/// Encode `image` on the blocking pool.
pub async fn encode_async(codec: Arc<Codec>, image: Image, opts: EncodingOptions) -> Result<Vec<u8>> {
    blocking(move || codec.encode_to_vec(&image, Some(&opts))).await
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;

    use super::*;
    use crate::guest::Guest;
    use crate::testing::FakeCodec;

    fn shared_codec() -> Arc<Codec> {
        let guests = vec![Box::new(FakeCodec::new()) as Box<dyn Guest>];
        Arc::new(Codec::from_guests(guests).unwrap())
    }

    #[tokio::test]
    async fn encode_then_decode() {
        let codec = shared_codec();
        let image = Image::Rgba(RgbaImage::from_pixel(5, 4, image::Rgba([9, 8, 7, 255])));
        let bytes = encode_async(Arc::clone(&codec), image, EncodingOptions::default())
            .await
            .unwrap();

        let desc = describe_async(Arc::clone(&codec), bytes.clone()).await.unwrap();
        let decoded = decode_async(codec, bytes, DecodingOptions::default()).await.unwrap();
        assert_eq!((desc.width, desc.height), (5, 4));
        assert_eq!(desc, decoded.descriptor);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tasks_share_one_instance() {
        let codec = shared_codec();
        let mut handles = Vec::new();
        for i in 0..16u8 {
            let codec = Arc::clone(&codec);
            let image = Image::Rgba(RgbaImage::from_pixel(3, 3, image::Rgba([i, 0, 0, 255])));
            handles.push(tokio::spawn(encode_async(codec, image, EncodingOptions::default())));
        }
        for handle in handles {
            let bytes = handle.await.unwrap().unwrap();
            assert!(!bytes.is_empty());
        }
    }

    #[tokio::test]
    async fn codec_errors_pass_through() {
        let codec = shared_codec();
        let err = decode_async(codec, b"garbage".to_vec(), DecodingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::DecodeFailed));
    }
}
