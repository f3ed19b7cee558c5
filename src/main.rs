use clap::{Arg, Command};
use diffscribe::backends::{BackendClient, Endpoints};
use diffscribe::config::PreferenceStore;
use diffscribe::credentials::CredentialStore;
use diffscribe::http_client::ReqwestHttpClient;
use diffscribe::session::Session;
use diffscribe::terminal::Terminal;
use diffscribe::vcs::GitCli;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let matches = Command::new("diffscribe")
        .about("Writes commit messages for your staged changes")
        .long_about(
            "diffscribe reads the staged diff, asks a cloud or local language model for a \
             conventional commit message, lets you review and edit it, and commits",
        )
        .ignore_errors(true)
        .arg(Arg::new("reset-config")
            .short('r')
            .long("reset-config")
            .help("Forget saved backend and model preferences")
            .action(clap::ArgAction::SetTrue))
        .arg(Arg::new("set-api-key")
            .long("set-api-key")
            .help("Save the DeepSeek API key")
            .value_name("API_KEY")
            .num_args(1))
        .arg(Arg::new("show-config")
            .long("show-config")
            .help("Show configuration information")
            .action(clap::ArgAction::SetTrue))
        .get_matches();

    if matches.get_flag("reset-config") {
        let path = PreferenceStore::get_preferences_path()?;
        if PreferenceStore::reset(&path)? {
            println!("✅ Preferences reset ({} removed)", path.display());
        } else {
            println!("No saved preferences to reset.");
        }
        return Ok(());
    }

    if let Some(api_key) = matches.get_one::<String>("set-api-key") {
        let credentials = CredentialStore::from_env()?;
        credentials.store(api_key)?;
        println!("✅ API key saved to {}", credentials.secret_path().display());
        return Ok(());
    }

    if matches.get_flag("show-config") {
        let credentials = CredentialStore::from_env()?;
        let source = credentials.lookup().map(|(_, source)| source.describe());
        PreferenceStore::open()?.show_config_info(source);
        println!("API key file: {}", credentials.secret_path().display());
        return Ok(());
    }

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n👋 Interrupted. Goodbye!");
            std::process::exit(0);
        }
    });

    let git = GitCli::new();
    if !git.is_available() {
        eprintln!("❌ git was not found on PATH. Install git and try again.");
        std::process::exit(1);
    }

    let store = PreferenceStore::open()?;
    let credentials = CredentialStore::from_env()?;
    let backends = BackendClient::new(ReqwestHttpClient::new(), Endpoints::from_env());
    info!(
        "Cloud endpoint {}, local endpoint {}",
        backends.endpoints().cloud_url,
        backends.endpoints().local_url
    );

    let mut session = Session::new(&git, &backends, store, credentials, Terminal::stdio());
    if let Err(e) = session.run().await {
        warn!("Session ended with an error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
