use tokio::sync::mpsc::Sender;

use crate::network::Packet;

/// Client side of a service, constructed from the server id and the
/// network ingress channel.
pub trait Client {
    fn from_server(server_id: String, net_tx: Sender<Packet>) -> Self;
}
