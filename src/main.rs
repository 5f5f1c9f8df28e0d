use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use decido::{
    app::App,
    app_dirs::AppDirs,
    catalog::{Catalog, DifficultyFilter},
    config::{Config, ConfigStore, FileConfigStore},
    identity::{IdentityWidget, Notify, SupabaseBackend, SupabaseConfig},
    logging,
    runtime::{CrosstermEventSource, FixedTicker, Runner, TrainerEvent},
    trainer::Trainer,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::Rect,
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Instant,
};
use tracing::{info, warn};

/// timed micro-decision trainer
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Practise making quick decisions: answer everyday scenarios against a countdown, then review your decision rate and average time."
)]
pub struct Cli {
    /// difficulty of the scenarios to draw (defaults to the last one used)
    #[clap(short = 'd', long, value_enum)]
    difficulty: Option<DifficultyFilter>,

    /// number of decisions per session
    #[clap(short = 'n', long)]
    session_length: Option<usize>,

    /// JSON scenario catalog to use instead of the built-in one
    #[clap(long)]
    catalog: Option<PathBuf>,

    /// disable sign-in and login tracking
    #[clap(long)]
    offline: bool,

    /// file to write logs to (defaults to the state directory)
    #[clap(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Layer command line overrides on top of the stored config
    fn apply(&self, config: &mut Config) {
        if let Some(difficulty) = self.difficulty {
            config.difficulty = difficulty;
        }
        if let Some(length) = self.session_length {
            config.session_length = config.clamp_length(length);
        }
        if self.offline {
            config.identity.enabled = false;
        }
    }

    fn load_catalog(&self) -> Result<Catalog, decido::catalog::CatalogError> {
        match &self.catalog {
            Some(path) => Catalog::from_path(path),
            None => Catalog::builtin(),
        }
    }
}

fn identity_widget(config: &Config) -> IdentityWidget {
    if !config.identity.enabled {
        return IdentityWidget::disabled();
    }

    let backend = SupabaseBackend::new(SupabaseConfig {
        url: config.identity.url.clone(),
        anon_key: config.identity.anon_key.clone(),
        redirect_port: config.identity.redirect_port,
        session_path: AppDirs::auth_session_path(),
    });

    match backend {
        Ok(backend) => IdentityWidget::new(Arc::new(backend), config.identity.app_slug.clone()),
        Err(e) => {
            warn!(error = %e, "identity provider unavailable, continuing signed out");
            IdentityWidget::disabled()
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    if let Some(path) = cli.log_file.clone().or_else(AppDirs::log_path) {
        if let Err(e) = logging::init(&path) {
            eprintln!("logging disabled: {e}");
        }
    }

    let catalog = cli.load_catalog()?;
    let store = FileConfigStore::new();
    let mut config = store.load();
    cli.apply(&mut config);

    info!(
        catalog = %catalog.name,
        scenarios = catalog.len(),
        identity = config.identity.enabled,
        "starting"
    );

    let identity = identity_widget(&config);
    let mut app = App::new(Trainer::new(catalog), config, Box::new(store), identity);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        warn!(error = %e, "exited with error");
    }
    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::default());

    let sender = Mutex::new(runner.sender());
    let notify: Notify = Arc::new(move |event| {
        if let Ok(tx) = sender.lock() {
            let _ = tx.send(TrainerEvent::Identity(event));
        }
    });
    app.identity_mut().start(notify);

    loop {
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;

        let event = runner.step();
        let size = terminal.size()?;
        app.handle(event, Rect::new(0, 0, size.width, size.height), Instant::now());

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}
