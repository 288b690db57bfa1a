mod shared;
mod web;

pub use shared::{CallbackResult, Message, ShutdownCallback};

use log::{debug, error, info};
use std::{
    fs,
    net::SocketAddr,
    sync::mpsc::{self as std_mpsc, RecvTimeoutError},
    thread,
    time::Duration,
};
use tokio::sync::broadcast;

use crate::{
    config::ServerConfig,
    error::{StartError, StopError},
};

/// A running HTTP server. The listener lives on its own runtime thread.
pub struct Instance {
    addr: SocketAddr,
    grace: Duration,
    message_tx: broadcast::Sender<Message>,
    done_rx: std_mpsc::Receiver<()>,
    handle: thread::JoinHandle<()>,
    shutdown_callbacks: Vec<ShutdownCallback>,
}

impl Instance {
    pub fn start(config: ServerConfig) -> Result<Self, StartError> {
        let addr = config.listen_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(StartError::Runtime)?;

        let (message_tx, message_rx) = broadcast::channel(16);
        let (bound_tx, bound_rx) = std_mpsc::channel();
        let (done_tx, done_rx) = std_mpsc::channel();

        let web_config = config.clone();
        let handle = thread::Builder::new()
            .name("http-server".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let server = match web::bind(&web_config, addr, message_rx) {
                        Ok((addr, server)) => {
                            let _ = bound_tx.send(Ok(addr));
                            server
                        }
                        Err(e) => {
                            let _ = bound_tx.send(Err(e));
                            return;
                        }
                    };
                    server.await;
                    debug!("Server on {} ended", addr);
                });
                let _ = done_tx.send(());
            })
            .map_err(StartError::Thread)?;

        let addr = match bound_rx.recv() {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(StartError::Bind(e));
            }
            Err(_) => {
                let _ = handle.join();
                return Err(StartError::Aborted);
            }
        };

        let mut instance = Self {
            addr,
            grace: config.grace,
            message_tx,
            done_rx,
            handle,
            shutdown_callbacks: Vec::new(),
        };

        if let Some(path) = config.pidfile {
            if let Err(source) = fs::write(&path, format!("{}\n", std::process::id())) {
                if let Err(e) = instance.stop() {
                    error!("Stopping server after pid file failure: {}", e);
                }
                return Err(StartError::Pidfile { path, source });
            }
            debug!("Wrote pid file {}", path.display());
            instance.on_shutdown(Box::new(move || {
                fs::remove_file(&path)?;
                debug!("Removed pid file {}", path.display());
                Ok(())
            }));
        }

        info!("Serving {} on http://{}", config.root.display(), addr);

        Ok(instance)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn on_shutdown(&mut self, callback: ShutdownCallback) {
        self.shutdown_callbacks.push(callback);
    }

    /// Run and drop all shutdown callbacks in registration order. Failures
    /// are logged and do not stop the remaining callbacks.
    pub fn run_shutdown_callbacks(&mut self) {
        for callback in self.shutdown_callbacks.drain(..) {
            if let Err(e) = callback() {
                error!("Shutdown callback failed: {}", e);
            }
        }
    }

    pub fn stop(self) -> Result<(), StopError> {
        info!("Stopping server on {}", self.addr);

        // No receivers left means the server already ended.
        let _ = self.message_tx.send(Message::Shutdown);

        match self.done_rx.recv_timeout(self.grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => return Err(StopError::GraceExceeded(self.grace)),
        }

        self.handle.join().map_err(|_| StopError::Panicked)?;
        info!("Server on {} stopped", self.addr);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    fn config(root: &Path) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            root: root.to_path_buf(),
            grace: Duration::from_secs(5),
            pidfile: None,
        }
    }

    #[test]
    fn it_serves_files_from_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "hello").unwrap();

        let instance = Instance::start(config(dir.path())).unwrap();
        let url = format!("http://{}/index.html", instance.addr());

        let mut response = ureq::get(&url).call().unwrap();
        assert_eq!(response.headers().get("server").unwrap(), concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
        assert_eq!(response.body_mut().read_to_string().unwrap(), "hello");

        instance.stop().unwrap();
    }

    #[test]
    fn it_fails_to_bind_a_used_port() {
        let dir = tempfile::tempdir().unwrap();
        let first = Instance::start(config(dir.path())).unwrap();

        let mut cfg = config(dir.path());
        cfg.port = first.addr().port();
        let err = Instance::start(cfg).err().unwrap();
        assert!(matches!(err, StartError::Bind(_)));

        first.stop().unwrap();
    }

    #[test]
    fn it_fails_on_unresolvable_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.host = "not a host name".to_string();
        assert!(matches!(Instance::start(cfg), Err(StartError::Resolve { .. })));
    }

    #[test]
    fn it_removes_the_pid_file_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("caddy.pid");
        let mut cfg = config(dir.path());
        cfg.pidfile = Some(pidfile.clone());

        let mut instance = Instance::start(cfg).unwrap();
        assert_eq!(fs::read_to_string(&pidfile).unwrap().trim(), std::process::id().to_string());

        instance.run_shutdown_callbacks();
        assert!(!pidfile.exists());
        instance.stop().unwrap();
    }

    #[test]
    fn it_runs_callbacks_in_order_despite_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut instance = Instance::start(config(dir.path())).unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let calls = calls.clone();
            instance.on_shutdown(Box::new(move || {
                calls.lock().unwrap().push(n);
                if n == 1 {
                    return Err("callback failed".into());
                }
                Ok(())
            }));
        }

        instance.run_shutdown_callbacks();
        instance.run_shutdown_callbacks();
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2]);
        instance.stop().unwrap();
    }
}
