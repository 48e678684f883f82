use std::path::PathBuf;

use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;

use crate::{ByteStream, StoreError};

/// What to upload.
///
/// Every attempt reopens the source: paths are read from disk again and
/// buffers are cloned. A stream is drained into memory on the first attempt
/// and replayed from there.
pub enum UploadSource {
    Path(PathBuf),
    Bytes(Bytes),
    Stream {
        pending: Mutex<Option<ByteStream>>,
        body: OnceCell<Bytes>,
    },
}

impl UploadSource {
    pub fn path<P: Into<PathBuf>>(path: P) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes<B: Into<Bytes>>(data: B) -> Self {
        Self::Bytes(data.into())
    }

    pub fn stream(stream: ByteStream) -> Self {
        Self::Stream {
            pending: Mutex::new(Some(stream)),
            body: OnceCell::new(),
        }
    }

    /// Body for the next attempt
    pub async fn open(&self) -> Result<ByteStream, StoreError> {
        match self {
            Self::Path(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    StoreError::fatal(format!("cannot open {}: {}", path.display(), e)).with_source(e)
                })?;
                Ok(Box::pin(ReaderStream::new(file)))
            }
            Self::Bytes(data) => Ok(replay(data.clone())),
            Self::Stream { pending, body } => {
                let data = body.get_or_try_init(|| drain(pending)).await?;
                Ok(replay(data.clone()))
            }
        }
    }
}

fn replay(chunk: Bytes) -> ByteStream {
    Box::pin(stream::once(async move { Ok(chunk) }))
}

/// Buffer the caller's stream. A stream that failed part way cannot be read again.
async fn drain(pending: &Mutex<Option<ByteStream>>) -> Result<Bytes, StoreError> {
    let taken = pending.lock().take();
    let mut chunks =
        taken.ok_or_else(|| StoreError::fatal("source stream failed on an earlier attempt"))?;

    let mut data = BytesMut::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| {
            StoreError::fatal(format!("reading source stream failed: {}", e)).with_source(e)
        })?;
        data.extend_from_slice(&chunk);
    }
    Ok(data.freeze())
}

impl std::fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(data) => write!(f, "Bytes({} bytes)", data.len()),
            Self::Stream { body, .. } => match body.get() {
                Some(data) => write!(f, "Stream({} bytes buffered)", data.len()),
                None => f.write_str("Stream"),
            },
        }
    }
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Bytes> for UploadSource {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(data))
    }
}

impl From<&'static [u8]> for UploadSource {
    fn from(data: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreErrorKind;
    use std::io::Write;

    async fn collect(mut body: ByteStream) -> Vec<u8> {
        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk.unwrap());
        }
        data
    }

    #[tokio::test]
    async fn test_bytes_reopen_every_attempt() {
        let source = UploadSource::bytes(&b"hello"[..]);

        assert_eq!(collect(source.open().await.unwrap()).await, b"hello");
        assert_eq!(collect(source.open().await.unwrap()).await, b"hello");
    }

    #[tokio::test]
    async fn test_path_is_read_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"console.log('fixture');").unwrap();
        let source = UploadSource::path(file.path());

        assert_eq!(collect(source.open().await.unwrap()).await, b"console.log('fixture');");
    }

    #[tokio::test]
    async fn test_missing_path_is_fatal() {
        let source = UploadSource::path("/definitely/not/here.js");

        let Err(err) = source.open().await else {
            panic!("expected missing file to fail");
        };
        assert_eq!(err.kind(), StoreErrorKind::Fatal);
    }

    #[tokio::test]
    async fn test_stream_is_replayed_on_every_attempt() {
        let body: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
        ]));
        let source = UploadSource::stream(body);

        assert_eq!(collect(source.open().await.unwrap()).await, b"abcd");
        assert_eq!(collect(source.open().await.unwrap()).await, b"abcd");
    }

    #[tokio::test]
    async fn test_broken_stream_is_fatal() {
        let body: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated")),
        ]));
        let source = UploadSource::stream(body);

        let Err(first) = source.open().await else {
            panic!("expected broken stream to fail");
        };
        assert_eq!(first.kind(), StoreErrorKind::Fatal);
        let Err(second) = source.open().await else {
            panic!("expected broken stream to stay failed");
        };
        assert_eq!(second.kind(), StoreErrorKind::Fatal);
    }
}
