use std::convert::Infallible;
use std::future::Future;
use std::net;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::runtime;
use tokio::sync::oneshot;

/// Which accepted connection a request arrived on, numbered from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnId(pub usize);

pub struct Server {
    addr: net::SocketAddr,
    connections: Arc<AtomicUsize>,
    panic_rx: std::sync::mpsc::Receiver<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Server {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if !::std::thread::panicking() {
            self.panic_rx
                .recv_timeout(Duration::from_secs(3))
                .expect("test server should not panic");
        }
    }
}

/// Serve HTTP/1.1 on a random local port, on its own thread and runtime.
///
/// Every request carries a [`ConnId`] extension.
pub fn http<F, Fut>(func: F) -> Server
where
    F: Fn(http::Request<hyper::body::Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = http::Response<String>> + Send + 'static,
{
    let listener = net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.set_nonblocking(true).expect("nonblocking");
    let addr = listener.local_addr().expect("local_addr");

    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let (panic_tx, panic_rx) = std::sync::mpsc::channel();

    thread::Builder::new()
        .name(format!("test-server-{}", addr))
        .spawn(move || {
            let rt = runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("new rt");
            rt.block_on(async move {
                let listener = TcpListener::from_std(listener).expect("from_std");
                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => break,
                        accepted = listener.accept() => {
                            let (stream, _) = accepted.expect("accepted");
                            let id = ConnId(counter.fetch_add(1, Ordering::SeqCst) + 1);
                            let func = func.clone();
                            tokio::spawn(async move {
                                let service = service_fn(move |mut req: http::Request<hyper::body::Incoming>| {
                                    req.extensions_mut().insert(id);
                                    let fut = (func.clone())(req);
                                    async move {
                                        let res = fut.await.map(|body| Full::new(Bytes::from(body)));
                                        Ok::<_, Infallible>(res)
                                    }
                                });
                                let _ = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await;
                            });
                        }
                    }
                }
            });
            let _ = panic_tx.send(());
        })
        .expect("thread spawn");

    Server {
        addr,
        connections,
        panic_rx,
        shutdown_tx: Some(shutdown_tx),
    }
}
