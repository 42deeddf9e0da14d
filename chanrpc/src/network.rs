use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use futures::Future;
use log::{info, warn};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{client::Client, server::Server};

/// One routed message: the request body plus the channel for its reply.
#[derive(Debug, Clone)]
pub struct Packet {
    pub to: String,
    pub reply: Sender<String>,
    pub data: String,
}

/// Message router connecting every node registered on it.
pub struct Network {
    pub tx: Sender<Packet>,
    rx: Receiver<Packet>,
    pub nodes: Arc<Mutex<HashMap<String, Sender<Packet>>>>,
}

impl Network {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            tx,
            rx,
            nodes: Arc::new(Mutex::new(HashMap::default())),
        }
    }

    /// Register a service under `id`, returning a client for it and the
    /// server routine to spawn.
    ///
    /// The factory is invoked again whenever the service errors out of its
    /// loop, so a restarted service begins from fresh state.
    pub fn register_service<S, C, F, V>(&self, id: String, f: F) -> (C, impl Future<Output = ()>)
    where
        F: Fn() -> V,
        S: Server<Service = V> + Send + 'static,
        C: Client,
    {
        let client = C::from_server(id.clone(), self.tx.clone());
        let nodes = self.nodes.clone();
        (client, async move {
            loop {
                let mut server = S::from_service(f());
                nodes
                    .lock()
                    .unwrap()
                    .insert(id.clone(), server.client_chan());
                match server.run().await {
                    Ok(()) => break,
                    Err(e) => info!("server {} restart: {}", id, e),
                }
            }
            nodes.lock().unwrap().remove(&id);
        })
    }

    /// Route packets between nodes. Runs until the network is dropped.
    pub async fn run(&mut self) {
        while let Some(p) = self.rx.recv().await {
            let node = {
                let nodes = self.nodes.lock().unwrap();
                nodes.get(&p.to).cloned()
            };
            match node {
                Some(chan) => {
                    if chan.send(p).await.is_err() {
                        warn!("send to node failed, dropped");
                    }
                }
                None => warn!("node not found, dropped"),
            }
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}
