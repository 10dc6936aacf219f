use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use clap::{Parser, Subcommand};
use rsakeep::{CryptoEngine, KdfParams, KeyRole, KeyStore, Storage, VaultBackend, default_storage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod auth;

const DEFAULT_PUBLIC_TAG: &str = "com.example.rsa.public";
const DEFAULT_PRIVATE_TAG: &str = "com.example.rsa.private";

#[derive(Debug, clap::Args)]
struct Argon2Args {
    /// Argon2 memory cost in KiB (default: 65536)
    #[arg(long = "argon-mem")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 3)
    #[arg(long = "argon-time")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 1)
    #[arg(long = "argon-parallelism")]
    parallelism: Option<u32>,
}

impl Argon2Args {
    fn to_kdf_params(&self) -> Result<KdfParams> {
        let default = KdfParams::default();

        KdfParams::new(
            self.mem_cost_kib.unwrap_or(default.mem_cost_kib()),
            self.time_cost.unwrap_or(default.time_cost()),
            self.parallelism.unwrap_or(default.parallelism()),
        )
    }
}

/// Role filter for `list`; encrypt takes public tags, decrypt private ones.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum RoleArg {
    Public,
    Private,
}

impl From<RoleArg> for KeyRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Public => KeyRole::Public,
            RoleArg::Private => KeyRole::Private,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "rsakeep")]
#[command(
    version,
    about = "Generate RSA key pairs, keep them under tags, encrypt and decrypt with RSA-OAEP."
)]
struct Cli {
    /// Path to the vault file
    #[arg(long, global = true, value_name = "PATH", env = "RSAKEEP_PATH")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates an empty vault
    Init {
        #[command(flatten)]
        argon2: Argon2Args,
    },

    /// Generates a 2048-bit key pair and stores both halves
    Generate {
        #[arg(long, default_value = DEFAULT_PUBLIC_TAG)]
        public_tag: String,

        #[arg(long, default_value = DEFAULT_PRIVATE_TAG)]
        private_tag: String,
    },

    /// Encrypts text with a stored public key and prints base64
    #[command(arg_required_else_help = true)]
    Encrypt {
        #[arg(long, default_value = DEFAULT_PUBLIC_TAG)]
        tag: String,
        text: String,
    },

    /// Decrypts base64 ciphertext with a stored private key
    #[command(arg_required_else_help = true)]
    Decrypt {
        #[arg(long, default_value = DEFAULT_PRIVATE_TAG)]
        tag: String,
        ciphertext: String,
    },

    /// Lists stored key tags
    List {
        /// Print role and last update as well
        #[arg(short, long, default_value_t = false)]
        all: bool,

        /// Only keys of this role
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
    },

    /// Shows information about the vault
    Info,
}

fn resolve_storage(path: Option<PathBuf>) -> Result<Storage> {
    match path {
        Some(p) => Ok(Storage::new(p)),
        None => default_storage(),
    }
}

fn open_vault(path: Option<PathBuf>) -> Result<Arc<VaultBackend>> {
    let storage = resolve_storage(path)?;
    let password = auth::read_password()?;
    Ok(Arc::new(VaultBackend::open(password, storage)?))
}

fn engine_for(vault: &Arc<VaultBackend>) -> CryptoEngine {
    CryptoEngine::new(KeyStore::new(vault.clone()))
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rsakeep=warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    match args.command {
        Commands::Init { argon2 } => {
            let kdf = argon2.to_kdf_params()?;
            let storage = resolve_storage(args.store)?;
            let password = auth::read_new_password()?;
            VaultBackend::init(password, storage, kdf)?;
            println!("vault initialized");
        }
        Commands::Generate {
            public_tag,
            private_tag,
        } => {
            let vault = open_vault(args.store)?;
            let pair = engine_for(&vault).generate_and_store(&public_tag, &private_tag)?;
            println!("key pair generated and stored");
            println!("public:      {public_tag}");
            println!("private:     {private_tag}");
            println!("fingerprint: {}", pair.public.fingerprint()?);
        }
        Commands::Encrypt { tag, text } => {
            let vault = open_vault(args.store)?;
            let ciphertext = engine_for(&vault).encrypt(text.as_bytes(), &tag)?;
            println!("{}", STANDARD.encode(ciphertext));
        }
        Commands::Decrypt { tag, ciphertext } => {
            let ciphertext = STANDARD
                .decode(ciphertext.trim())
                .context("ciphertext is not valid base64")?;
            let vault = open_vault(args.store)?;
            let plaintext = engine_for(&vault).decrypt(&ciphertext, &tag)?;
            println!("{}", String::from_utf8_lossy(&plaintext));
        }
        Commands::List { all, role } => {
            let vault = open_vault(args.store)?;
            let store = KeyStore::new(vault.clone());

            if !all && role.is_none() {
                let mut tags = store.list_tags();
                tags.sort();
                for tag in tags {
                    println!("{tag}");
                }
                return Ok(());
            }

            let mut entries = store.list_entries();
            if let Some(role) = role.map(KeyRole::from) {
                entries.retain(|e| e.role == role);
            }
            entries.sort_by(|a, b| a.tag.cmp(&b.tag));

            if !all {
                for e in entries {
                    println!("{}", e.tag);
                }
                return Ok(());
            }

            if entries.is_empty() {
                println!("No keys stored.");
                return Ok(());
            }

            let tag_width = entries
                .iter()
                .map(|e| e.tag.len())
                .chain(std::iter::once("Tag".len()))
                .max()
                .unwrap_or(0);

            println!("{:<tag_width$}  {:<7}  Updated", "Tag", "Role");
            println!("{:-<tag_width$}  {:-<7}  {:-<7}", "", "", "");
            for e in entries {
                println!("{:<tag_width$}  {:<7}  {}", e.tag, e.role.to_string(), e.updated);
            }
        }
        Commands::Info => {
            let vault = open_vault(args.store)?;
            println!("{}", vault.info()?);
        }
    }

    Ok(())
}
