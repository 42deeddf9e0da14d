use anyhow::Result;
use tokio::sync::mpsc::Sender;

use crate::network::Packet;

/// Server side of a service: owns the service value and drains its inbox.
#[async_trait::async_trait]
pub trait Server {
    type Service;
    fn from_service(svc: Self::Service) -> Self;
    fn client_chan(&self) -> Sender<Packet>;
    /// Handle one request. `Ok(false)` means the inbox closed.
    async fn handle(&mut self) -> Result<bool>;
    async fn run(&mut self) -> Result<()> {
        while self.handle().await? {}
        Ok(())
    }
}
