//! cosdesk: command-line front end of the upload console.
//!
//! Set COSDESK_BACKEND_URL and COSDESK_ANON_KEY. The session is kept in
//! `~/.cosdesk/session.json` (override with COSDESK_SESSION_FILE) and
//! passwords are read from COSDESK_PASSWORD or stdin.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use cosdesk_cli::{
    init_tracing, load_session, read_password, read_secret, records_table, save_session,
    users_table, StderrNotifier,
};
use cosdesk_client::{AuthBackend, CancellationToken};
use cosdesk_console::upload::DEFAULT_PATH;
use cosdesk_console::{settle, ConsoleContext, FileHandle, Navigation, Route, SessionState, UploadProgress};
use cosdesk_core::models::{
    RecordFilters, RecordStatus, UserFilters, UserProfile, UserRole, UserStatus,
};
use cosdesk_core::validation::{self, ChangePasswordForm, LoginForm, RegisterForm, ResetForm};
use cosdesk_core::{format_file_size, AppError, Config, ErrorMetadata};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "cosdesk", about = "Upload console CLI")]
struct Cli {
    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        email: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in account and its console profile
    Whoami,
    /// Create an account
    Register {
        email: String,
        /// Display name
        #[arg(long)]
        name: String,
    },
    /// Send a password recovery email
    ResetPassword {
        email: String,
    },
    /// Change the password of the signed-in account
    ChangePassword,
    /// Upload files as a new pending version
    Upload {
        /// Version label, e.g. v1.2.0
        #[arg(long)]
        version: String,
        #[arg(long)]
        remark: Option<String>,
        /// Destination directory inside the bucket
        #[arg(long, conflicts_with = "quick")]
        path: Option<String>,
        /// Use the n-th configured quick path (starting at 0)
        #[arg(long)]
        quick: Option<usize>,
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Upload records
    Records {
        #[command(subcommand)]
        sub: RecordCommands,
    },
    /// Console users (admins only)
    Users {
        #[command(subcommand)]
        sub: UserCommands,
    },
    /// List storage buckets
    Buckets,
}

#[derive(Subcommand)]
enum RecordCommands {
    /// List records, newest upload first
    List {
        /// Exact version
        #[arg(long)]
        version: Option<String>,
        /// Uploader email (substring match)
        #[arg(long)]
        user: Option<String>,
        /// pending, approved or rejected
        #[arg(long)]
        status: Option<RecordStatus>,
        /// Uploaded at or after (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Uploaded at or before (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },
    /// Approve a pending record
    Approve { id: Uuid },
    /// Reject a pending record
    Reject { id: Uuid },
}

#[derive(Subcommand)]
enum UserCommands {
    /// List users, newest first
    List {
        /// Name (substring match)
        #[arg(long)]
        name: Option<String>,
        /// Email (substring match)
        #[arg(long)]
        email: Option<String>,
        /// normal or admin
        #[arg(long)]
        role: Option<UserRole>,
        /// enabled or disabled
        #[arg(long)]
        status: Option<UserStatus>,
    },
    /// Enable a user
    Enable { id: Uuid },
    /// Disable a user
    Disable { id: Uuid },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

/// Run the route guard for the screen a command belongs to.
fn require(state: &SessionState, route: Route) -> anyhow::Result<()> {
    match settle(state, route.path()) {
        Navigation::Allow(_) => Ok(()),
        Navigation::Redirect(Route::Login) => {
            bail!("Not signed in. Run `cosdesk login <email>` first")
        }
        Navigation::Redirect(to) => bail!(
            "{} is not available to this account (redirected to {})",
            route,
            to
        ),
        Navigation::Wait => bail!("Session is still loading"),
    }
}

fn require_profile(state: &SessionState) -> anyhow::Result<UserProfile> {
    match state.profile() {
        Some(profile) => Ok(profile.clone()),
        None => bail!(
            "No console profile for {}",
            state.email().unwrap_or("this account")
        ),
    }
}

/// Wait for the store to pick up a sign-in for `email`.
async fn settled_as(console: &ConsoleContext, email: &str) -> SessionState {
    let mut rx = console.session().subscribe();
    let result = rx
        .wait_for(|s| s.is_settled() && s.email() == Some(email))
        .await
        .map(|s| s.clone());
    result.unwrap_or_else(|_| console.session().state())
}

fn describe(state: &SessionState) -> String {
    match (state.email(), state.profile()) {
        (None, _) => "Not signed in".to_string(),
        (Some(email), Some(profile)) => format!(
            "{} ({}, {}, {})",
            email,
            profile.name.as_deref().unwrap_or("-"),
            profile.role,
            profile.status
        ),
        (Some(email), None) => format!("{} (no console profile)", email),
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

async fn execute(console: &ConsoleContext, json: bool, command: Commands) -> anyhow::Result<()> {
    let gateway = console.api().gateway();
    let auth = console.auth();
    let state = console.session().settled().await;

    match command {
        Commands::Login { email } => {
            require(&state, Route::Login).map_err(|_| {
                anyhow::anyhow!(
                    "Already signed in as {}. Run `cosdesk logout` first",
                    state.email().unwrap_or("-")
                )
            })?;
            let form = LoginForm {
                email: email.trim().to_string(),
                password: read_password("Password")?,
            };
            validation::check(&form)?;
            gateway
                .run(auth.sign_in(&form.email, &form.password))
                .await?;
            let state = settled_as(console, &form.email).await;
            gateway.notifier().success("Signed in");
            println!("{}", describe(&state));
        }
        Commands::Logout => {
            gateway.run(auth.sign_out()).await?;
            gateway.notifier().success("Signed out");
        }
        Commands::Whoami => {
            if json {
                print_json(&serde_json::json!({
                    "email": state.email(),
                    "profile": state.profile(),
                }))?;
            } else {
                println!("{}", describe(&state));
            }
        }
        Commands::Register { email, name } => {
            let password = read_password("Password")?;
            let confirm_password = read_secret("Confirm password")?;
            let form = RegisterForm {
                name: name.trim().to_string(),
                email: email.trim().to_string(),
                password,
                confirm_password,
            };
            validation::check(&form)?;
            let outcome = gateway
                .run(auth.sign_up(&form.email, &form.password, Some(&form.name)))
                .await?;
            if outcome.needs_verification {
                gateway
                    .notifier()
                    .success("Account created. Check your inbox to verify the email address");
            } else {
                let state = settled_as(console, &form.email).await;
                gateway.notifier().success("Account created");
                println!("{}", describe(&state));
            }
        }
        Commands::ResetPassword { email } => {
            let form = ResetForm {
                email: email.trim().to_string(),
            };
            validation::check(&form)?;
            gateway.run(auth.reset_password_for_email(&form.email)).await?;
            gateway
                .notifier()
                .success("Recovery email sent if the address is registered");
        }
        Commands::ChangePassword => {
            require(&state, Route::Home)?;
            let form = ChangePasswordForm {
                current_password: read_password("Current password")?,
                new_password: read_secret("New password")?,
                confirm_password: read_secret("Confirm new password")?,
            };
            validation::check(&form)?;
            gateway
                .run(auth.update_password(&form.current_password, &form.new_password))
                .await?;
            gateway.notifier().success("Password changed");
        }
        Commands::Upload {
            version,
            remark,
            path,
            quick,
            files,
        } => {
            require(&state, Route::Home)?;
            let uploader_email = match (state.profile(), state.email()) {
                (Some(profile), _) => profile.email.clone(),
                (None, Some(email)) => email.to_string(),
                (None, None) => bail!("Not signed in"),
            };

            let mut staged = console.staging();
            let target = match quick {
                Some(index) => match staged.quick_paths().get(index) {
                    Some(path) => path.clone(),
                    None => bail!(
                        "No quick path #{} (configured: {})",
                        index,
                        staged.quick_paths().join(", ")
                    ),
                },
                None => path.unwrap_or_else(|| DEFAULT_PATH.to_string()),
            };

            let mut handles = Vec::with_capacity(files.len());
            for file in &files {
                handles.push(gateway.run(FileHandle::from_path(file)).await?);
            }
            staged.stage(handles);
            staged.apply_quick_path(&target);
            eprintln!(
                "{} file(s), {} -> {}",
                staged.len(),
                format_file_size(staged.total_size()),
                target
            );

            let request = staged.submit(&version, remark.as_deref())?;
            let (tx, mut rx) = mpsc::unbounded_channel();
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        UploadProgress::Started { name, key } => {
                            eprintln!("  uploading {} as {}", name, key)
                        }
                        UploadProgress::Finished { name, .. } => eprintln!("  done {}", name),
                        UploadProgress::Failed { name, error } => {
                            eprintln!("  failed {}: {}", name, error)
                        }
                    }
                }
            });

            let signal = cancel_on_ctrl_c();
            let report = console
                .uploader()
                .upload(request, &uploader_email, Some(tx), Some(&signal))
                .await?;
            if let Err(e) = printer.await {
                tracing::debug!(error = %e, "Progress printer ended abnormally");
            }

            if json {
                print_json(&report.records)?;
            } else if !report.records.is_empty() {
                println!("{}", records_table(&report.records));
            }
            if !report.is_complete() {
                bail!(
                    "{} of {} file(s) failed to upload",
                    report.failed.len(),
                    report.failed.len() + report.records.len()
                );
            }
            gateway.notifier().success("Upload submitted for review");
        }
        Commands::Records { sub } => {
            require(&state, Route::Records)?;
            let screen = console.records();
            match sub {
                RecordCommands::List {
                    version,
                    user,
                    status,
                    from,
                    to,
                } => {
                    screen
                        .search(RecordFilters {
                            version,
                            upload_user: user,
                            status,
                            uploaded_from: from,
                            uploaded_to: to,
                        })
                        .await?;
                    let rows = screen.rows();
                    if json {
                        print_json(&rows)?;
                    } else {
                        println!("{}", records_table(&rows));
                    }
                }
                RecordCommands::Approve { id } => {
                    let record = screen.approve(id, &require_profile(&state)?).await?;
                    gateway
                        .notifier()
                        .success(&format!("{} {} approved", record.file_name, record.version));
                }
                RecordCommands::Reject { id } => {
                    let record = screen.reject(id, &require_profile(&state)?).await?;
                    gateway
                        .notifier()
                        .success(&format!("{} {} rejected", record.file_name, record.version));
                }
            }
        }
        Commands::Users { sub } => {
            require(&state, Route::Users)?;
            let screen = console.users();
            match sub {
                UserCommands::List {
                    name,
                    email,
                    role,
                    status,
                } => {
                    screen.load_buckets().await;
                    screen
                        .search(UserFilters {
                            name,
                            email,
                            role,
                            status,
                        })
                        .await?;
                    let rows = screen.rows();
                    if json {
                        let users: Vec<&UserProfile> = rows.iter().map(|r| &r.user).collect();
                        print_json(&users)?;
                    } else {
                        println!("{}", users_table(&rows));
                    }
                }
                UserCommands::Enable { id } => set_status(&screen, id, UserStatus::Enabled).await?,
                UserCommands::Disable { id } => {
                    set_status(&screen, id, UserStatus::Disabled).await?
                }
            }
        }
        Commands::Buckets => {
            require(&state, Route::Users)?;
            let buckets = console.api().fetch_buckets(None).await?;
            if json {
                print_json(&buckets)?;
            } else {
                for bucket in buckets {
                    println!(
                        "{}  {}  {}",
                        bucket.id,
                        bucket.bucket,
                        bucket.domain.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }

    Ok(())
}

async fn set_status(
    screen: &cosdesk_console::UsersScreen,
    id: Uuid,
    target: UserStatus,
) -> anyhow::Result<()> {
    screen.open().await?;
    let Some(row) = screen.rows().into_iter().find(|r| r.user.id == id) else {
        bail!("No user with id {}", id);
    };
    if row.user.status == target {
        println!("{} is already {}", row.user.email, target);
        return Ok(());
    }
    let updated = screen.toggle_status(&row.user).await?;
    println!("{} is now {}", updated.email, updated.status);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::from_env()
        .context("Failed to load configuration. Set COSDESK_BACKEND_URL and COSDESK_ANON_KEY")?;
    let session_file = config.session_file();
    let notifier = StderrNotifier::new();
    let result = match ConsoleContext::from_config(config, Arc::new(notifier.clone())).await {
        Ok(console) => {
            console.auth().restore(load_session(&session_file)?);
            console.session().start();

            let result = execute(&console, cli.json, cli.command).await;

            save_session(&session_file, console.auth().session().as_ref())?;
            console.session().shutdown().await;
            result
        }
        Err(e) => Err(e.into()),
    };

    let Err(err) = result else {
        return Ok(());
    };
    match err.downcast_ref::<AppError>() {
        Some(app) if app.is_cancelled() => std::process::exit(1),
        Some(app) if app.is_user_visible() => {
            notifier.ensure_shown(&app.client_message());
            std::process::exit(1)
        }
        Some(app @ AppError::Validation(_)) => {
            for (field, message) in app.field_messages() {
                eprintln!("{}: {}", field, message);
            }
            std::process::exit(2)
        }
        _ => Err(err),
    }
}
