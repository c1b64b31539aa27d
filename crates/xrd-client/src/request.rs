//! The single path every public operation funnels a wire request through:
//! build a [`MsgHandlerAdapter`], submit it to the [`PostMaster`], and wait
//! for the terminal outcome on a one-shot channel.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::oneshot;
use xrd_msghandler::{HandlerConfig, Outcome};
use xrd_postmaster::PostMaster;
use xrd_stream::RequestHandler;
use xrd_task::TaskManager;
use xrd_transport::TransportHandler;
use xrd_wire::RequestHeader;

use crate::adapter::MsgHandlerAdapter;
use crate::error::{ClientError, StatusClass, XrdStatus};

/// Submits one request to `host:port` and awaits its terminal outcome.
///
/// On success returns the assembled response body, the `(status,
/// host-list)` pair every asynchronous surface resolves to, and the
/// `host:port` the request was finally answered from (which may differ
/// from `host:port` if the request was redirected) -- the endpoint a
/// caller that just opened a file should keep addressing subsequent
/// reads/writes to.
pub(crate) async fn submit_request<T: TransportHandler + 'static>(
    postmaster: &Arc<PostMaster<T>>,
    tasks: &Arc<TaskManager>,
    host: &str,
    port: u16,
    header: RequestHeader,
    body: BytesMut,
    config: HandlerConfig,
) -> Result<(BytesMut, XrdStatus, String), ClientError> {
    let host_id = format!("{host}:{port}");
    let (tx, rx) = oneshot::channel();
    let adapter = MsgHandlerAdapter::new(
        host_id,
        port,
        header,
        body.clone(),
        config,
        postmaster.clone(),
        tasks.clone(),
        tx,
    );
    let handler: Arc<dyn RequestHandler> = adapter.clone();
    postmaster.send(host, port, header, body, 0, handler).await?;

    let outcome = rx.await.map_err(|_| ClientError::Cancelled)?;
    let host_list = adapter.redirect_trail();
    let final_host = adapter.current_host_id();
    match outcome {
        Outcome::Ok(data) => Ok((data, XrdStatus { class: StatusClass::Ok, host_list }, final_host)),
        Outcome::Error(err) => Err(ClientError::from(err)),
        Outcome::Fatal(err) => Err(ClientError::from(err)),
    }
}
