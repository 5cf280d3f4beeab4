use clap::Parser;
use rfid_assign::core::codec;
use rfid_assign::domain::ports::{AuthService, RegistryApi};
use rfid_assign::utils::{logger, validation::Validate};
use rfid_assign::{normalize_plate, AppConfig, CliConfig, Command, RegistryClients, RfidError};
use serde_json::json;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::debug!("CLI config: {:?}", cli);

    if let Err(e) = run(cli.command).await {
        tracing::error!("❌ {} (category: {:?})", e, e.category());
        eprintln!("❌ {}", e.user_message());
        std::process::exit(e.exit_code());
    }
}

async fn run(command: Command) -> Result<(), RfidError> {
    match command {
        Command::Encode { plate, record_id } => {
            let payload = codec::build_identity(&plate, &record_id)?;
            println!("{}", codec::to_hex(&payload));
        }
        Command::Decode { epc_hex } => {
            let decoded = codec::parse(&epc_hex)?;
            let output = json!({
                "plate": decoded.plate,
                "record_id": decoded.record_id,
                "cleared": decoded.is_cleared(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Normalize { raw } => {
            println!("{}", normalize_plate(&raw));
        }
        Command::Lookup { plate, config } => {
            let config = AppConfig::from_file(&config)?;
            // 驗證配置
            config.validate()?;
            let (client_id, client_secret) = config.credentials()?;

            let clients = RegistryClients::from_config(&config)?;
            clients
                .auth
                .authenticate(client_id, client_secret)
                .await
                .into_result()?;

            let plate = normalize_plate(&plate);
            match clients.registry.lookup_by_plate(&plate).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("null"),
            }
            clients.auth.logout().await;
        }
    }
    Ok(())
}
