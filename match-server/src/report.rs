//! Result report back-channel to the lobby

use log::info;
use shared::{read_frame, write_frame, FrameError, Request, Response};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("could not reach lobby at {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("report exchange failed: {0}")]
    Frame(#[from] FrameError),
    #[error("lobby did not answer within {0:?}")]
    Timeout(Duration),
    #[error("lobby rejected the report: {0}")]
    Rejected(String),
}

/// Sends one report over a fresh connection and waits for the lobby's ack
pub async fn submit_report(
    addr: &str,
    report: &Request,
    limit: Duration,
) -> Result<(), ReportError> {
    let exchange = async {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ReportError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        write_frame(&mut stream, report).await?;
        let response: Response = read_frame(&mut stream).await?;
        if !response.ok {
            return Err(ReportError::Rejected(response.reason().to_string()));
        }
        Ok::<(), ReportError>(())
    };

    timeout(limit, exchange)
        .await
        .map_err(|_| ReportError::Timeout(limit))??;

    info!("Result for room {} reported to {}", report.data["room_id"], addr);
    Ok(())
}
