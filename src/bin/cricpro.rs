#[macro_use]
extern crate log;

use cricpro::{check_db_version, connect_db, get_setting, init_app, init_logger, AppConfig};
use dotenv::dotenv;
use log::LevelFilter;
use poem::{listener::TcpListener, middleware::Cors, EndpointExt, Server};
use std::sync::Arc;

use structopt::StructOpt;

/// CricPro backend server.
#[derive(Debug, PartialEq, StructOpt)]
#[structopt(setting=structopt::clap::AppSettings::ColoredHelp, name="cricpro", author="CricPro Developers")]
struct Opt {
    /// Activate debug mode
    /// short and long flags (--debug) will be deduced from the field's name
    #[structopt(name = "debug", long = "debug")]
    debug: bool,

    /// Activate openapi mode
    #[structopt(name = "openapi", short = "o", long = "openapi")]
    openapi: bool,

    /// Enable simple CORS support.
    #[structopt(name = "cors", short = "c", long = "cors")]
    cors: bool,

    /// 127.0.0.1 or 0.0.0.0
    #[structopt(name = "host", short = "H", long = "host", possible_values=&["127.0.0.1", "0.0.0.0"], default_value = "127.0.0.1")]
    host: String,

    /// Which port.
    #[structopt(name = "port", short = "p", long = "port", default_value = "3000")]
    port: String,

    /// Database url, such as postgres:://user:pass@host:port/dbname.
    /// You can also set it with env var: DATABASE_URL.
    #[structopt(name = "database-url", short = "d", long = "database-url")]
    database_url: Option<String>,

    /// Pool size for database connection.
    #[structopt(name = "pool-size", short = "s", long = "pool-size")]
    pool_size: Option<u32>,

    /// JWT secret key used to sign the login tokens with HS256.
    /// You can also set it with env var: JWT_SECRET_KEY.
    /// If you don't set it, a random key is generated and every token is invalidated when the server restarts.
    #[structopt(name = "jwt-secret-key", short = "k", long = "jwt-secret-key")]
    jwt_secret_key: Option<String>,

    /// How long a login token is valid, in seconds.
    /// You can also set it with env var: TOKEN_TTL_SECS. Default: 86400.
    #[structopt(name = "token-ttl", short = "t", long = "token-ttl")]
    token_ttl: Option<i64>,

    /// Razorpay key id for the match fee checkout.
    /// You can also set it with env var: RAZORPAY_KEY_ID.
    #[structopt(name = "razorpay-key-id", long = "razorpay-key-id")]
    razorpay_key_id: Option<String>,

    /// Razorpay key secret, used to create orders and verify payment signatures.
    /// You can also set it with env var: RAZORPAY_KEY_SECRET.
    #[structopt(name = "razorpay-key-secret", long = "razorpay-key-secret")]
    razorpay_key_secret: Option<String>,
}

fn build_config(args: &Opt) -> AppConfig {
    let jwt_secret_key = match get_setting(args.jwt_secret_key.clone(), "JWT_SECRET_KEY") {
        Some(v) => v,
        None => {
            warn!("You don't set JWT_SECRET_KEY environment variable, so we generate a random one. All tokens will be invalid after a restart.");
            uuid::Uuid::new_v4().simple().to_string()
        }
    };
    let mut config = AppConfig::new(&jwt_secret_key);

    let token_ttl = args.token_ttl.or_else(|| {
        get_setting(None, "TOKEN_TTL_SECS").and_then(|v| match v.parse::<i64>() {
            Ok(ttl) => Some(ttl),
            Err(e) => {
                warn!("TOKEN_TTL_SECS is not a number ({}), use the default.", e);
                None
            }
        })
    });
    if let Some(ttl) = token_ttl {
        config.token_ttl_secs = ttl;
    }

    let key_id = get_setting(args.razorpay_key_id.clone(), "RAZORPAY_KEY_ID");
    let key_secret = get_setting(args.razorpay_key_secret.clone(), "RAZORPAY_KEY_SECRET");
    match (key_id, key_secret) {
        (Some(key_id), Some(key_secret)) => config.with_razorpay(&key_id, &key_secret),
        _ => {
            warn!("RAZORPAY_KEY_ID or RAZORPAY_KEY_SECRET is not set, online payments are disabled.");
            config
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    dotenv().ok();

    let args = Opt::from_args();

    let log_result = if args.debug {
        init_logger("cricpro", LevelFilter::Debug)
    } else {
        init_logger("cricpro", LevelFilter::Info)
    };

    if let Err(log) = log_result {
        error!(target:"stdout", "Log initialization error, {}", log);
        std::process::exit(1);
    };

    let host = args.host.clone();
    let port = args.port.clone();

    println!("\n\t\t*** Launch cricpro on {}:{} ***", host, port);

    let config = Arc::new(build_config(&args));

    // Connect to database.
    let database_url = match get_setting(args.database_url.clone(), "DATABASE_URL") {
        Some(v) => v,
        None => {
            error!("{}", "DATABASE_URL is not set.");
            std::process::exit(1);
        }
    };

    let pool_size = args.pool_size.unwrap_or(10);
    let pool = connect_db(&database_url, pool_size).await;
    let arc_pool = Arc::new(pool);

    // Check the environment, such as database version.
    match check_db_version(&arc_pool.clone()).await {
        Ok(_) => (),
        Err(err) => {
            error!("Check database version failed, {}", err);
            std::process::exit(1);
        }
    };

    let server_url = format!("http://{}:{}", host, port);
    let route = init_app(arc_pool, config, &server_url, args.openapi);

    if args.cors {
        info!("CORS mode is enabled.");
        let route = route.with(Cors::new().allow_origin("*"));
        Server::new(TcpListener::bind(format!("{}:{}", host, port)))
            .run(route)
            .await
    } else {
        warn!("CORS mode is disabled. If you need the CORS, please use `--cors` flag.");
        Server::new(TcpListener::bind(format!("{}:{}", host, port)))
            .run(route)
            .await
    }
}
