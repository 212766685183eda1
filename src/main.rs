use std::process::exit;

#[tokio::main]
async fn main() {
    match regoforge::cli::run().await {
        Ok(code) => exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit(2);
        }
    }
}
