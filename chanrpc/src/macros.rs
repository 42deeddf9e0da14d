#[macro_export]
macro_rules! service {
    () => {
        compile_error!("empty service is not allowed");
    };
    (
        $(#[$service_attr:meta])*
        service $svc_name:ident {
            $(
                $(#[$method_attr:meta])*
                fn $method_name:ident($($arg_id:ident: $arg_ty:ty),*) -> $output:ty;
            )*
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$service_attr])*
        pub mod $svc_name {
            use super::*;

            use $crate::network::Packet;
            use $crate::{client, server};

            use $crate::anyhow::{anyhow, Result};
            use $crate::async_trait;
            use $crate::log::{trace, warn};
            use $crate::serde::{Deserialize, Serialize};
            use $crate::serde_json;
            use $crate::tokio::sync::mpsc::{self, Receiver, Sender};

            #[derive(Debug, Deserialize, Serialize)]
            pub enum Request {
                $(
                    #[allow(non_camel_case_types)]
                    $method_name { $($arg_id: $arg_ty),* }
                ),*
            }

            mod response {
                use super::*;
                $(
                    #[derive(Deserialize, Serialize)]
                    #[allow(non_camel_case_types)]
                    pub struct $method_name {
                        pub data: $output
                    }
                )*
            }

            #[async_trait]
            pub trait Service: Send + 'static {
                $(
                    $(#[$method_attr])*
                    async fn $method_name(&mut self, $($arg_id: $arg_ty),*) -> Result<$output>;
                )*
            }

            #[derive(Debug, Clone)]
            pub struct Client {
                server_id: String,
                tx: Sender<Packet>,
            }

            impl Client {
                $(
                    pub async fn $method_name(&self, $($arg_id: $arg_ty),*) -> Result<$output> {
                        let req = Request::$method_name { $($arg_id),* };
                        let resp = self.call(serde_json::to_string(&req)?).await?;
                        let resp: response::$method_name = serde_json::from_str(&resp)?;
                        Ok(resp.data)
                    }
                )*

                pub async fn call(&self, req: String) -> Result<String> {
                    let (tx, mut rx) = mpsc::channel(1);
                    self.tx
                        .send(Packet {
                            to: self.server_id.clone(),
                            reply: tx,
                            data: req,
                        })
                        .await?;
                    match rx.recv().await {
                        Some(resp) => {
                            trace!("resp from {}: {}", self.server_id, resp);
                            Ok(resp)
                        }
                        None => Err(anyhow!("no reply from {}", self.server_id)),
                    }
                }
            }

            impl client::Client for Client {
                fn from_server(server_id: String, net_tx: Sender<Packet>) -> Self {
                    Self {
                        server_id,
                        tx: net_tx,
                    }
                }
            }

            #[derive(Debug)]
            pub struct Server<T: Service> {
                svc: T,
                tx: Sender<Packet>,
                rx: Receiver<Packet>,
            }

            #[async_trait]
            impl<T: Service> server::Server for Server<T> {
                type Service = T;

                fn from_service(svc: Self::Service) -> Self {
                    let (tx, rx) = mpsc::channel(100);
                    Self { svc, tx, rx }
                }

                fn client_chan(&self) -> Sender<Packet> {
                    self.tx.clone()
                }

                async fn handle(&mut self) -> Result<bool> {
                    let Packet { reply, data, .. } = match self.rx.recv().await {
                        Some(p) => p,
                        None => return Ok(false),
                    };
                    trace!("handle recv: {}", &data);
                    let req: Request = serde_json::from_str(&data)?;
                    let resp = match req {
                        $(
                            Request::$method_name { $($arg_id),* } => {
                                let data = self.svc.$method_name($($arg_id),*).await?;
                                serde_json::to_string(&response::$method_name { data })?
                            }
                        )*
                    };
                    trace!("handle send: {}", &resp);
                    if reply.send(resp).await.is_err() {
                        warn!("client went away before the reply");
                    }
                    Ok(true)
                }
            }
        }
    };
}
