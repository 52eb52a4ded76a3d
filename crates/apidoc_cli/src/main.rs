//! Command-line shell over the entity request surface.
//!
//! # Responsibility
//! - Turn one `request` invocation into an `ApiRequest` and print the response.
//! - Seed users, repositories, members and modules into a database file.
//!
//! Examples:
//!   apidoc request docs.db GET '/entity/get?id=3' --user 7
//!   apidoc request docs.db POST /entity/lock '{"id":3}' --user 7 --log-dir /var/log/apidoc
//!   apidoc seed docs.db repo payments 1 public
//!   apidoc ping

use apidoc_core::db::Connection;
use apidoc_core::model::catalog::Visibility;
use apidoc_core::model::user::NewUser;
use apidoc_core::repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
use apidoc_core::repo::user_repo::{SqliteUserRepository, UserRepository};
use apidoc_core::{open_db, ApiRequest, EntityApi, Method, Session};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "apidoc")]
#[command(about = "Query and seed an API documentation database", version)]
struct Cli {
    /// Acting user id; requests run anonymously without it
    #[arg(long, global = true)]
    user: Option<i64>,

    /// Absolute directory for rolling log files
    #[arg(long, global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one request to the entity routes
    Request {
        db: PathBuf,
        #[arg(value_parser = parse_method)]
        method: Method,
        /// Route path with an optional query string, e.g. `/entity/get?id=3`
        target: String,
        /// JSON request body
        body: Option<String>,
    },

    /// Insert fixture records
    Seed {
        db: PathBuf,
        #[command(subcommand)]
        target: SeedTarget,
    },

    /// Check that the core library is linked
    Ping,
}

#[derive(Debug, PartialEq, Subcommand)]
enum SeedTarget {
    User {
        fullname: String,
        email: String,
    },
    Repo {
        name: String,
        owner_id: i64,
        #[arg(value_parser = parse_visibility, default_value = "private")]
        visibility: Visibility,
    },
    Member {
        repository_id: i64,
        user_id: i64,
    },
    Module {
        repository_id: i64,
        name: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = apidoc_core::default_log_level();
        if let Err(err) = apidoc_core::init_logging(level.as_str(), log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(cli.command, cli.user) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, user_id: Option<i64>) -> Result<String, String> {
    match command {
        Command::Ping => Ok(format!(
            "apidoc_core ping={} version={}",
            apidoc_core::ping(),
            apidoc_core::core_version()
        )),
        Command::Request {
            db,
            method,
            target,
            body,
        } => {
            let request = build_request(method, &target, body.as_deref(), user_id)?;
            let conn = open_db(&db).map_err(|err| err.to_string())?;
            let api = EntityApi::try_new(&conn).map_err(|err| err.to_string())?;
            let response = api.handle(&request);
            log::debug!(
                "event=cli_request module=cli status=ok content_type={}",
                response.content_type
            );
            Ok(response.body)
        }
        Command::Seed { db, target } => {
            let conn = open_db(&db).map_err(|err| err.to_string())?;
            seed(&conn, target).map_err(|err| err.to_string())
        }
    }
}

fn build_request(
    method: Method,
    target: &str,
    body: Option<&str>,
    user_id: Option<i64>,
) -> Result<ApiRequest, String> {
    let body = match body {
        Some(text) => serde_json::from_str(text)
            .map_err(|err| format!("request body is not valid JSON: {err}"))?,
        None => Value::Null,
    };
    let (path, query) = split_target(target);
    Ok(ApiRequest {
        method,
        path,
        session: user_id.map_or_else(Session::anonymous, Session::for_user),
        query,
        body,
    })
}

fn seed(conn: &Connection, target: SeedTarget) -> Result<String, Box<dyn std::error::Error>> {
    let users = SqliteUserRepository::new(conn);
    let catalog = SqliteCatalogRepository::new(conn);
    let output = match target {
        SeedTarget::User { fullname, email } => {
            serde_json::to_string(&users.create_user(&NewUser::new(fullname, email))?)?
        }
        SeedTarget::Repo {
            name,
            owner_id,
            visibility,
        } => serde_json::to_string(&catalog.create_repository(&name, owner_id, visibility)?)?,
        SeedTarget::Member {
            repository_id,
            user_id,
        } => {
            catalog.add_member(repository_id, user_id)?;
            serde_json::json!({ "repositoryId": repository_id, "userId": user_id }).to_string()
        }
        SeedTarget::Module {
            repository_id,
            name,
        } => serde_json::to_string(&catalog.create_module(repository_id, &name)?)?,
    };
    Ok(output)
}

/// Splits `/entity/get?id=3&x=` into a path and percent-decoded query map.
fn split_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, query)) => (
            path.to_string(),
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        ),
        None => (target.to_string(), HashMap::new()),
    }
}

fn parse_method(value: &str) -> Result<Method, String> {
    Method::parse(value).ok_or_else(|| format!("unsupported method `{value}`; expected GET|POST"))
}

fn parse_visibility(value: &str) -> Result<Visibility, String> {
    Visibility::parse(value)
        .ok_or_else(|| format!("unknown visibility `{value}`; expected public|private"))
}
