//! Admin bootstrap tool
//!
//! Creates (or resets) the admin account and the configured tree name in
//! the document store. Run once against a fresh deployment:
//!
//! ```text
//! ADMIN_EMAIL=admin@example.com ADMIN_PASSWORD=... TREE_NAME=... setup-admin
//! ```

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rootline::auth::{hash_password, Role};
use rootline::models::{self, TreeSettings, User};
use rootline::store::{DocumentStore, Filter, MongoStore};

#[derive(Parser, Debug)]
#[command(name = "setup-admin")]
#[command(about = "Bootstrap the rootline admin account")]
struct Args {
    /// Admin account email
    #[arg(long, env = "ADMIN_EMAIL")]
    admin_email: String,

    /// Admin account password
    #[arg(long, env = "ADMIN_PASSWORD")]
    admin_password: String,

    /// Tree name users must supply at registration (optional)
    #[arg(long, env = "TREE_NAME")]
    tree_name: Option<String>,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "rootline")]
    mongodb_db: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "setup_admin=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.admin_password.len() < 8 {
        error!("ADMIN_PASSWORD must be at least 8 characters");
        return std::process::ExitCode::FAILURE;
    }

    let store = match MongoStore::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(store) => store,
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    let password_hash = match hash_password(&args.admin_password) {
        Ok(h) => h,
        Err(e) => {
            error!("Failed to hash password: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    // Reuse an existing account with this email, otherwise create one.
    let existing = match store
        .query(models::USERS, Filter::new().eq("email", args.admin_email.as_str()))
        .await
    {
        Ok(docs) => docs.into_iter().next(),
        Err(e) => {
            error!("Failed to query users: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    let user = match existing {
        Some(doc) => {
            let mut user: User = match models::from_document(doc) {
                Ok(u) => u,
                Err(e) => {
                    error!("Failed to decode existing user: {}", e);
                    return std::process::ExitCode::FAILURE;
                }
            };
            info!("Updating existing account {} to admin", user.email);
            user.password_hash = password_hash;
            user.role = Role::Admin;
            user.is_admin = true;
            user.is_verified = true;
            user.updated_at = chrono::Utc::now();
            user
        }
        None => {
            info!("Creating admin account {}", args.admin_email);
            let mut user = User::new(
                uuid::Uuid::new_v4().to_string(),
                args.admin_email.clone(),
                password_hash,
                Role::Admin,
            );
            user.is_verified = true;
            user
        }
    };

    let user_doc = match models::to_document(&user) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to encode user: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };
    if let Err(e) = store.set(models::USERS, &user.id, user_doc).await {
        error!("Failed to write admin user: {}", e);
        return std::process::ExitCode::FAILURE;
    }
    info!("Admin account ready: {}", user.email);

    if let Some(tree_name) = args.tree_name {
        let settings = TreeSettings {
            tree_name: tree_name.clone(),
        };
        let settings_doc = match models::to_document(&settings) {
            Ok(mut d) => {
                d.insert("id", models::TREE_SETTINGS_ID);
                d
            }
            Err(e) => {
                error!("Failed to encode settings: {}", e);
                return std::process::ExitCode::FAILURE;
            }
        };
        if let Err(e) = store
            .set(models::SETTINGS, models::TREE_SETTINGS_ID, settings_doc)
            .await
        {
            error!("Failed to write tree settings: {}", e);
            return std::process::ExitCode::FAILURE;
        }
        info!("Tree name configured: {}", tree_name);
    }

    // Sanity check the write round-trip
    match store.get(models::USERS, &user.id).await {
        Ok(Some(_)) => info!("Setup complete"),
        Ok(None) => error!("Verification read returned nothing"),
        Err(e) => error!("Verification read failed: {}", e),
    }

    std::process::ExitCode::SUCCESS
}
