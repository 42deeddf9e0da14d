use chanrpc::{anyhow::Result, Network};

chanrpc::service! {
    service echo {
        fn say(text: String) -> String;
    }
}

struct Echo;

#[chanrpc::async_trait]
impl echo::Service for Echo {
    async fn say(&mut self, text: String) -> Result<String> {
        Ok(text)
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut net = Network::new();
    let (client, routine): (echo::Client, _) =
        net.register_service::<echo::Server<Echo>, _, _, _>("echo".to_owned(), || Echo);
    tokio::spawn(routine);

    // Wait until the server has registered itself before routing begins.
    let nodes = net.nodes.clone();
    tokio::spawn(async move { net.run().await });
    while nodes.lock().unwrap().get("echo").is_none() {
        tokio::task::yield_now().await;
    }

    let reply = client.say("hello".to_owned()).await.unwrap();
    println!("{}", reply);
}
