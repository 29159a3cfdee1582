use lumen_orchestrator::{agent::Orchestrator, config::Config};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn prompt(
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
    label: &str,
) -> std::io::Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    lines.next_line().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    info!(
        sources = ?orchestrator.registry().list(),
        synthesizer = orchestrator.synthesizer_name(),
        "Lumen orchestrator ready"
    );

    println!("\n{}", "=".repeat(50));
    println!("LUMEN: DISTRIBUTED AGENTIC MIDDLEWARE");
    println!("{}", "=".repeat(50));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(subject_id) = prompt(&mut lines, "\n User ID (or 'exit'): ").await? else {
            break;
        };
        if subject_id.trim().eq_ignore_ascii_case("exit") {
            break;
        }

        let Some(request_text) =
            prompt(&mut lines, "Request (e.g. 'name' or 'full profile'): ").await?
        else {
            break;
        };

        println!("\n--- Execution Flow ---");
        match orchestrator.run(&subject_id, &request_text).await {
            Ok(result) => {
                for (i, step) in result.reasoning_trace.iter().enumerate() {
                    println!("  {}: {}", i + 1, step);
                }

                println!("\n--- Final Response ---");
                println!("{}", serde_json::to_string_pretty(&result.output)?);
                println!("Sources: {}", result.visited.join(" -> "));
            }
            Err(e) => {
                eprintln!("Lookup failed: {}", e);
            }
        }
        println!("{}", "-".repeat(50));
    }

    Ok(())
}
