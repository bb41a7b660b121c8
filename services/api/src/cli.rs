use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand, ValueEnum};
use grantdesk::auth::{AuthenticatedUser, TokenAuthority};
use grantdesk::config::AppConfig;
use grantdesk::error::AppError;
use grantdesk::workflows::grants::repository::UserRole;
use grantdesk::workflows::grants::UserId;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Grant Desk",
    about = "Run and demonstrate the grant application service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Mint a bearer token signed with the configured secret
    Token(TokenArgs),
    /// Walk a few applications through the lifecycle in-process
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// CSV export (id,email,role,is_active,email_verified) used to seed the user directory
    #[arg(long)]
    pub(crate) users_csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct TokenArgs {
    /// Subject user id
    #[arg(long)]
    pub(crate) user_id: String,
    /// Email address embedded in the token
    #[arg(long)]
    pub(crate) email: String,
    /// Role granted by the token
    #[arg(long, value_enum, default_value_t = RoleArg::User)]
    pub(crate) role: RoleArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum RoleArg {
    User,
    Admin,
    SuperAdmin,
}

impl From<RoleArg> for UserRole {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::User => UserRole::User,
            RoleArg::Admin => UserRole::Admin,
            RoleArg::SuperAdmin => UserRole::SuperAdmin,
        }
    }
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Token(args) => {
            let config = AppConfig::load()?;
            let token = mint_token(&TokenAuthority::from_config(&config.auth), args)?;
            println!("{token}");
            Ok(())
        }
        Command::Demo(args) => run_demo(args),
    }
}

fn mint_token(authority: &TokenAuthority, args: TokenArgs) -> Result<String, AppError> {
    let user = AuthenticatedUser {
        id: UserId(args.user_id),
        email: args.email,
        role: args.role.into(),
    };
    Ok(authority.issue(&user)?)
}
