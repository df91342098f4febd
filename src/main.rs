use procgraph::{clean_logger, cli};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let res = cli::run().await;
    clean_logger();
    if let Err(err) = res {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
