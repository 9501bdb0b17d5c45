//! Testable Property 5: a connection that fails once on first send then
//! succeeds lets a retryable call through, but propagates the fault
//! immediately for a non-retryable (`_can_retry=False`) call.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dirt_core::{CallOutcome, ClientBinding, KwArgs, Message, RemoteAddress, Value, read_frame, write_frame};
use dirt_rpc::native::{NativeClient, Pool};
use tokio::net::TcpListener;

/// Accepts connections on `port`: the first is read once then dropped
/// without a reply (a transport fault from the client's point of view);
/// every subsequent connection is served a proper `return true`.
async fn spawn_flaky_server(port: u16) {
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let accept_count = Arc::new(AtomicUsize::new(0));
    tokio::spawn(async move {
        loop {
            let (mut stream, _peer) = listener.accept().await.unwrap();
            let count = accept_count.fetch_add(1, Ordering::SeqCst);
            let codec = dirt_core::default_codec();
            tokio::spawn(async move {
                let _ = read_frame(&mut stream, codec.as_ref()).await;
                if count == 0 {
                    return;
                }
                let _ = write_frame(&mut stream, codec.as_ref(), &Message::Return(Value::Bool(true))).await;
            });
        }
    });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}

fn proxy_call(address: RemoteAddress) -> (Arc<Pool>, NativeClient) {
    let pool = Arc::new(Pool::new(dirt_core::default_codec()));
    let client = NativeClient::new(pool.clone(), dirt_core::default_codec());
    (pool, client)
}

#[tokio::test]
async fn retryable_call_survives_one_transport_fault() {
    spawn_flaky_server(18901).await;
    let address = RemoteAddress::new("dirt", "127.0.0.1", 18901);
    let (_pool, client) = proxy_call(address.clone());

    let call = dirt_core::Call::new("debug.ping", vec![], KwArgs::new(), dirt_core::CallFlags::default()).unwrap();
    let outcome = client.call(&address, call).await.unwrap();
    assert!(matches!(outcome, CallOutcome::Value(Value::Bool(true))));
}

#[tokio::test]
async fn non_retryable_call_propagates_the_first_fault() {
    spawn_flaky_server(18902).await;
    let address = RemoteAddress::new("dirt", "127.0.0.1", 18902);
    let (_pool, client) = proxy_call(address.clone());

    let flags = dirt_core::CallFlags::new(true, false);
    let call = dirt_core::Call::new("debug.ping", vec![], KwArgs::new(), flags).unwrap();
    let err = client.call(&address, call).await.unwrap_err();
    assert!(err.is_retryable());
}
