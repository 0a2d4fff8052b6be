use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use persona_client::{
    ClientConfig, Field, FormCoordinator, FormPhase, FormTarget, InMemoryStore, Mutation,
    PersonaClient, PersonaId, ValidationState, server,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "persona")]
#[command(about = "Manage persona records over the REST persona API")]
struct Cli {
    /// Base URL of the persona API (overrides PERSONA_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List personas ordered by surname, then name
    List {
        #[arg(long)]
        filter: Option<String>,
    },
    Get {
        id: String,
    },
    Add {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Edit an existing persona; omitted fields keep their stored value
    Edit {
        id: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    Delete {
        id: String,
    },
    /// Check whether an identifier is still free
    Check {
        id: String,
    },
    /// Run the reference REST backend over an in-memory store
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: String,
    },
}

#[derive(clap::Args)]
struct FieldArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    surname: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    birth_date: Option<String>,
}

impl FieldArgs {
    fn values(&self) -> [(Field, Option<&String>); 5] {
        [
            (Field::Name, self.name.as_ref()),
            (Field::Surname, self.surname.as_ref()),
            (Field::Email, self.email.as_ref()),
            (Field::Phone, self.phone.as_ref()),
            (Field::BirthDate, self.birth_date.as_ref()),
        ]
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env().context("failed to load client configuration")?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    if let Command::Serve { addr } = &cli.command {
        return serve(addr).await;
    }

    let client = PersonaClient::connect(config).await?;

    match cli.command {
        Command::List { filter } => list(&client, filter.as_deref()),
        Command::Get { id } => {
            let id = parse_id(&id)?;
            let persona = client.cache().fetch(&id).await?;
            println!("{}", serde_json::to_string_pretty(&persona)?);
            Ok(())
        }
        Command::Add { id, fields } => {
            let mut form = client.form(FormTarget::create());
            form.set_identifier(&id)?;
            fill_and_submit(&mut form, &fields).await
        }
        Command::Edit { id, fields } => {
            let mut form = client.form(FormTarget::edit(parse_id(&id)?));
            form.load().await?;
            fill_and_submit(&mut form, &fields).await
        }
        Command::Delete { id } => {
            let receipt = client.cache().mutate(Mutation::Delete(parse_id(&id)?)).await?;
            println!("deleted {}", receipt.identifier);
            Ok(())
        }
        Command::Check { id } => {
            let id = parse_id(&id)?;
            let validator = client.validator();
            validator.check(&id, None);
            match validator.resolved().await {
                ValidationState::Duplicate => println!("{id} is already registered"),
                ValidationState::CheckFailed => println!("{id} could not be verified"),
                _ => println!("{id} is available"),
            }
            Ok(())
        }
        Command::Serve { .. } => Ok(()),
    }
}

fn parse_id(raw: &str) -> Result<PersonaId> {
    PersonaId::parse(raw).map_err(|e| anyhow!(e))
}

fn list(client: &PersonaClient, filter: Option<&str>) -> Result<()> {
    let snapshot = client.cache().snapshot();
    let rows = match filter {
        Some(query) => snapshot.filter(query),
        None => snapshot.iter().collect(),
    };

    println!(
        "{:<10} {:<20} {:<20} {:<30} {:<10} {}",
        "ID", "NAME", "SURNAME", "EMAIL", "PHONE", "BIRTH DATE"
    );
    for persona in &rows {
        println!(
            "{:<10} {:<20} {:<20} {:<30} {:<10} {}",
            persona.identifier,
            persona.name,
            persona.surname,
            persona.email,
            persona.phone,
            persona.birth_date
        );
    }
    println!("({} of {} personas)", rows.len(), snapshot.len());
    Ok(())
}

/// Runs the same blur, settle and submit sequence an interactive form goes through.
async fn fill_and_submit(form: &mut FormCoordinator, fields: &FieldArgs) -> Result<()> {
    form.blur_identifier();
    let phase = form.settle().await;
    print_notices(form);
    if phase == FormPhase::Duplicate {
        bail!("identifier is already registered");
    }

    for (field, value) in fields.values() {
        if let Some(value) = value {
            form.set_field(field, value)?;
        }
    }

    let result = form.submit().await;
    print_notices(form);
    let receipt = result?;
    if !receipt.refreshed {
        info!("saved, but the persona list could not be refreshed");
    }
    Ok(())
}

fn print_notices(form: &mut FormCoordinator) {
    for notice in form.take_notices() {
        println!("{notice}");
    }
}

async fn serve(addr: &str) -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let app = server::router(store);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(address = %addr, "persona backend started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("persona=info,persona_client=info,tower_http=info")
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
