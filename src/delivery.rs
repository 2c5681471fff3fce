use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader, ReadBuf};
use tokio_util::io::ReaderStream;

use crate::error::Result;
use crate::report::{PreparedArchive, StudentReportArtifact};
use crate::staging::StagingArea;

/// Upper bound on the bytes read from disk per body chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

const PDF: &str = "application/pdf";
const ZIP: &str = "application/zip";

/// An open archive that keeps its staging area alive until fully read.
pub struct StagedFile {
    file: File,
    _staging: StagingArea,
}

impl AsyncRead for StagedFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_read(cx, buf)
    }
}

impl StagedFile {
    pub async fn open(archive: PreparedArchive) -> Result<(Self, u64)> {
        let file = File::open(&archive.path).await?;
        let len = file.metadata().await?.len();
        Ok((
            Self {
                file,
                _staging: archive.staging,
            },
            len,
        ))
    }
}

/// Streams an archive in bounded chunks. The staging area is removed once
/// the body is dropped, whether or not the client read it to the end.
pub async fn archive_response(archive: PreparedArchive) -> Result<Response> {
    let disposition = attachment(&archive.file_name);
    let (file, len) = StagedFile::open(archive).await?;
    let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(ZIP)),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub fn document_response(artifact: StudentReportArtifact) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(PDF)),
            (header::CONTENT_DISPOSITION, attachment(&artifact.file_name)),
        ],
        artifact.bytes,
    )
        .into_response()
}

/// Copies an archive to `out` through a bounded buffer, then drops its staging.
pub async fn save_archive(archive: PreparedArchive, out: &Path) -> Result<u64> {
    let (file, _) = StagedFile::open(archive).await?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut target = File::create(out).await?;
    let copied = tokio::io::copy_buf(&mut reader, &mut target).await?;
    target.sync_all().await?;
    Ok(copied)
}

/// `attachment; filename="..."` with characters that cannot travel in a
/// quoted header value replaced.
fn attachment(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
