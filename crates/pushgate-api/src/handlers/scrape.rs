use std::{
    io::{self, BufWriter, Write},
    sync::Arc,
};

use axum::{
    body::Body,
    extract::State,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, header};
use pushgate_aggregate::Aggregate;
use pushgate_expfmt::Format;
use tokio::sync::mpsc;
use tracing::debug;

const CHUNK_SIZE: usize = 64 * 1024;
const CHANNEL_DEPTH: usize = 8;

/// `GET /metrics`
///
/// The render runs on the blocking pool and streams through a bounded
/// channel. When the client goes away the next send fails, the render
/// aborts and the family lock it holds is released.
pub async fn scrape(State(aggregate): State<Arc<Aggregate>>, headers: HeaderMap) -> Response {
    let format = Format::negotiate(
        headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok()),
    );

    let (sender, receiver) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_DEPTH);
    let failures = sender.clone();
    tokio::task::spawn_blocking(move || {
        let writer = BufWriter::with_capacity(CHUNK_SIZE, ChannelWriter { sender });
        if let Err(err) = aggregate.render(writer, format) {
            debug!(error = %err, "scrape ended early");
            let _ = failures.blocking_send(Err(io::Error::other(err.to_string())));
        }
    });

    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|chunk| (chunk, receiver))
    });

    (
        [(header::CONTENT_TYPE, HeaderValue::from_static(format.content_type()))],
        Body::from_stream(stream),
    )
        .into_response()
}

struct ChannelWriter {
    sender: mpsc::Sender<io::Result<Bytes>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sender
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "scrape client disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
