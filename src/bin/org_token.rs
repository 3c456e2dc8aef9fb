use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use miette::{Context, IntoDiagnostic};
use tracing::debug;

use ockam_org_token::envelope;
use ockam_org_token::logs::{Logging, LoggingConfiguration};
use ockam_org_token::{unwrap_uploaded_token, DecryptedCredential, InMemoryAssetStore, RefreshContext};

/// Unwrap and produce organization tokens
#[derive(Debug, Parser)]
#[command(name = "org_token", version, arg_required_else_help = true)]
struct OrgTokenCommand {
    #[command(subcommand)]
    subcommand: OrgTokenSubcommand,
}

#[derive(Debug, Subcommand)]
enum OrgTokenSubcommand {
    Unwrap(UnwrapCommand),
    Seal(SealCommand),
}

/// Decrypt an uploaded token and print the metadata of its credential
#[derive(Debug, Args)]
struct UnwrapCommand {
    /// PEM certificate of the organization key pair
    #[arg(long, value_name = "CERT_PATH")]
    cert: PathBuf,

    /// Private key of the organization key pair
    #[arg(long, value_name = "KEY_PATH")]
    key: PathBuf,

    /// Encrypted token: an ECIES envelope, armored or binary, or an S/MIME message
    #[arg(value_name = "TOKEN")]
    token: PathBuf,
}

/// Encrypt a credential for a certificate and print the token. P-256 certificates get an
/// armored envelope, RSA certificates an S/MIME message
#[derive(Debug, Args)]
struct SealCommand {
    /// PEM certificate of the recipient
    #[arg(long, value_name = "CERT_PATH")]
    cert: PathBuf,

    /// JSON file with the consumer key and secret, the access token and secret, and the access token expiry
    #[arg(value_name = "CREDENTIAL_JSON")]
    credential: PathBuf,
}

impl UnwrapCommand {
    async fn run(self, ctx: &RefreshContext) -> miette::Result<()> {
        let store = InMemoryAssetStore::with_key_pair(read(&self.cert).await?, read(&self.key).await?);
        let token = tokio::fs::File::open(&self.token)
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("cannot open {}", self.token.display()))?;

        let (encrypted, credential) = unwrap_uploaded_token(ctx, &store, token).await?;
        debug!(size = encrypted.len(), "token read");

        // secrets are never printed
        println!("consumer key:        {}", credential.consumer_key());
        println!(
            "access token expiry: {}",
            credential.access_token_expiry_utc()
        );
        Ok(())
    }
}

impl SealCommand {
    async fn run(self) -> miette::Result<()> {
        let certificate = read(&self.cert).await?;
        let credential: DecryptedCredential = serde_json::from_slice(&read(&self.credential).await?)
            .into_diagnostic()
            .wrap_err("invalid credential file")?;

        let sealed = envelope::seal(&certificate, &credential).into_diagnostic()?;
        let sealed = String::from_utf8(sealed).into_diagnostic()?;
        print!("{sealed}");
        Ok(())
    }
}

async fn read(path: &Path) -> miette::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot read {}", path.display()))
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let command = OrgTokenCommand::parse();

    let logging = LoggingConfiguration::from_env()?;
    let _guard = Logging::setup(&logging)?;
    let ctx = RefreshContext::from_env()?;

    match command.subcommand {
        OrgTokenSubcommand::Unwrap(c) => c.run(&ctx).await,
        OrgTokenSubcommand::Seal(c) => c.run().await,
    }
}
