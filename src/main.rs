#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = sql_autograder::run().await {
        eprintln!("sql-autograder fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
