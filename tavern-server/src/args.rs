use clap::Parser;

/// Command line arguments for the tavern server binary.
///
/// The inference settings also honor the `OLLAMA_BASE_URL`,
/// `OLLAMA_DEFAULT_MODEL` and `OLLAMA_TIMEOUT_MS` environment
/// variables; flags win over the environment.
#[derive(Parser, Clone, Debug)]
pub struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, default_value_t = 3000)]
    pub port: u16,
    #[arg(
        long = "ollama-url",
        env = "OLLAMA_BASE_URL",
        default_value = "http://localhost:11434"
    )]
    pub ollama_url: String,
    #[arg(long, env = "OLLAMA_DEFAULT_MODEL", default_value = "llama3")]
    pub model: String,
    #[arg(long, env = "OLLAMA_TIMEOUT_MS", default_value_t = 120_000)]
    pub timeout_ms: u64,
}
