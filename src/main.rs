use clap::Parser;

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let cli = interfaces_of_power::Cli::parse();
    let code = interfaces_of_power::run(cli)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
