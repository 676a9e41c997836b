#[tokio::main]
async fn main() {
    if let Err(err) = apibridge::mcp::server::run_stdio().await {
        eprintln!("apibridge: {}", err);
        if let Some(hint) = &err.hint {
            eprintln!("apibridge: hint: {}", hint);
        }
        std::process::exit(1);
    }
}
