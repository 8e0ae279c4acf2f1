//! Exercises the binary wire protocol end to end over [`domainctl::wire::in_process_pair`]:
//! issue an asynchronous `slow` dispatch, cancel it mid-flight, and observe both the
//! cancellation ack and the dispatch's own terminal `Cancelled` frame arrive. Response
//! frames are adapted into a [`Stream`] with `async_stream` rather than hand-unrolled
//! sequential reads, the same shape the dispatcher itself uses to bridge a sink into an
//! async consumer.

#[path = "common/mod.rs"]
mod common;

use std::io;

use domainctl::wire::dispatcher::WireServer;
use domainctl::wire::in_process_pair;
use domainctl::wire::protocol::{
    CANCEL_ASYNCHRONOUS_OPERATION, EXECUTE_ASYNCHRONOUS, PARAM_CANCELLATION_RESULT,
    PARAM_HANDLE_CANCELLATION, PARAM_HANDLE_RESULT_COMPLETE, PARAM_OPERATION, PARAM_REQUEST_ID,
    REQUEST_OPERATION,
};
use domainctl::wire::codec::write_value;
use domainctl::value::Value;
use futures_util::{Stream, StreamExt, pin_mut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

#[derive(Debug)]
enum Frame {
    RequestId(u32),
    Complete(u32),
    Cancelled(u32),
    CancelResult { request_id: u32, delivered: bool },
}

async fn read_frame<R: AsyncRead + Unpin + Send>(r: &mut R) -> io::Result<Frame> {
    let _handler_id = r.read_u8().await?;
    let tag = r.read_u8().await?;
    match tag {
        PARAM_REQUEST_ID => Ok(Frame::RequestId(r.read_u32().await?)),
        PARAM_HANDLE_RESULT_COMPLETE => {
            let request_id = r.read_u32().await?;
            let _compensating = domainctl::wire::codec::read_value(r).await?;
            Ok(Frame::Complete(request_id))
        }
        PARAM_HANDLE_CANCELLATION => Ok(Frame::Cancelled(r.read_u32().await?)),
        PARAM_CANCELLATION_RESULT => {
            let request_id = r.read_u32().await?;
            let delivered = r.read_u8().await? != 0;
            Ok(Frame::CancelResult { request_id, delivered })
        }
        other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unexpected tag {other:#04x}"))),
    }
}

fn frame_stream<R>(mut r: R) -> impl Stream<Item = io::Result<Frame>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async_stream::stream! {
        loop {
            match read_frame(&mut r).await {
                Ok(frame) => yield Ok(frame),
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
    }
}

#[tokio::test]
async fn cancelling_a_slow_dispatch_delivers_both_the_ack_and_the_terminal_frame() {
    common::init_tracing();
    let server = WireServer::new(common::controller());
    let client = in_process_pair(server);
    let (read_half, mut write_half) = tokio::io::split(client);

    let mut operation = Value::object();
    operation.as_object_mut().unwrap().set("operation", Value::from("slow"));

    write_half.write_u8(0).await.unwrap();
    write_half.write_u8(REQUEST_OPERATION).await.unwrap();
    write_half.write_u8(EXECUTE_ASYNCHRONOUS).await.unwrap();
    write_half.write_u8(PARAM_OPERATION).await.unwrap();
    write_value(&mut write_half, &operation).await.unwrap();
    write_half.flush().await.unwrap();

    let stream = frame_stream(read_half);
    pin_mut!(stream);

    let request_id = match stream.next().await.unwrap().unwrap() {
        Frame::RequestId(id) => id,
        other => panic!("expected a request id frame first, got {other:?}"),
    };

    write_half.write_u8(0).await.unwrap();
    write_half.write_u8(REQUEST_OPERATION).await.unwrap();
    write_half.write_u8(CANCEL_ASYNCHRONOUS_OPERATION).await.unwrap();
    write_half.write_u8(PARAM_REQUEST_ID).await.unwrap();
    write_half.write_u32(request_id).await.unwrap();
    write_half.flush().await.unwrap();

    let mut saw_ack = false;
    let mut saw_cancelled = false;
    for _ in 0..2 {
        match stream.next().await.unwrap().unwrap() {
            Frame::CancelResult { request_id: id, delivered } => {
                assert_eq!(id, request_id);
                assert!(delivered, "cancellation should have reached the in-flight slow dispatch");
                saw_ack = true;
            }
            Frame::Cancelled(id) => {
                assert_eq!(id, request_id);
                saw_cancelled = true;
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert!(saw_ack && saw_cancelled);
}

#[tokio::test]
async fn synchronous_dispatch_still_completes_normally() {
    common::init_tracing();
    let server = WireServer::new(common::controller());
    let client = in_process_pair(server);
    let (read_half, mut write_half) = tokio::io::split(client);

    let mut operation = Value::object();
    operation.as_object_mut().unwrap().set("operation", Value::from("read-resource"));

    write_half.write_u8(3).await.unwrap();
    write_half.write_u8(REQUEST_OPERATION).await.unwrap();
    write_half.write_u8(domainctl::wire::protocol::EXECUTE_SYNCHRONOUS).await.unwrap();
    write_half.write_u8(PARAM_OPERATION).await.unwrap();
    write_value(&mut write_half, &operation).await.unwrap();
    write_half.flush().await.unwrap();

    let stream = frame_stream(read_half);
    pin_mut!(stream);
    match stream.next().await.unwrap().unwrap() {
        Frame::Complete(_) => {}
        other => panic!("expected Complete, got {other:?}"),
    }
}
