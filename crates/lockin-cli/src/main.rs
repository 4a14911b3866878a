use clap::{CommandFactory, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "lockin", version, about = "LockIn focus timer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background authority until Ctrl-C
    Daemon,
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Notification filtering
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// User settings stored with the timer state
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Completed focus sessions
    History {
        /// Number of most recent sessions to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = lockin_core::Config::load_or_default();
    lockin_core::logging::init(&config.log.filter);

    let result = match cli.command {
        Commands::Daemon => commands::daemon::run(config).await,
        Commands::Timer { action } => commands::timer::run(action, &config).await,
        Commands::Notify { action } => commands::notify::run(action, &config).await,
        Commands::Settings { action } => commands::settings::run(action).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::History { limit } => commands::history::run(limit).await,
        Commands::Completions { shell } => {
            commands::completions::run(shell, &mut Cli::command());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
