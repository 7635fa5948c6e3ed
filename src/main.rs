/**
* filename : main
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::sync::RwLock;

use xExec::config::Config;
use xExec::core::{recommend, ExecutorFactory, ExecutorParams};
use xExec::exchange::{BinanceSpotExchange, MockExchange, SharedExchange};
use xExec::utils::logging;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // 설정 로드
    let config = Config::load()?;

    // 로깅 초기화
    logging::init(&config.logging.level)?;
    log::info!("주문 실행 엔진 시작 (v{})", xExec::VERSION);

    // 명령줄 인수 확인
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("execute") => {
            let type_name = args.get(2).context("execution type is required")?;
            let params = args.get(3).context("parameters JSON is required")?;
            run_execution(config, type_name, params).await?;
        }
        Some("recommend") => {
            let values = args[2..]
                .iter()
                .map(|v| v.parse::<f64>().with_context(|| format!("invalid number: {}", v)))
                .collect::<Result<Vec<f64>, _>>()?;
            if values.len() != 4 {
                return Err(anyhow!("recommend needs <quantity> <volume> <volatility> <spread>"));
            }
            println!("{}", recommend(values[0], values[1], values[2], values[3]));
        }
        _ => print_usage(),
    }

    Ok(())
}

fn print_usage() {
    println!("usage:");
    println!("  xExec execute <market|limit|iceberg|twap|scaled|oco> '<params-json>'");
    println!("  xExec recommend <quantity> <volume> <volatility> <spread>");
}

fn build_exchange(config: &Config) -> Result<SharedExchange, anyhow::Error> {
    if config.exchange.use_mock {
        log::info!("모의 거래소 사용");
        return Ok(Arc::new(RwLock::new(MockExchange::new())));
    }

    let api_key = config
        .exchange
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("EXCHANGE_API_KEY is not set"))?;
    let api_secret = config
        .exchange
        .api_secret
        .clone()
        .ok_or_else(|| anyhow!("EXCHANGE_API_SECRET is not set"))?;
    let base_url = config
        .exchange
        .base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    log::info!("거래소 연결: {} ({})", config.exchange.name, base_url);
    Ok(Arc::new(RwLock::new(BinanceSpotExchange::new(base_url, api_key, api_secret))))
}

async fn run_execution(config: Config, type_name: &str, params_json: &str) -> Result<(), anyhow::Error> {
    let params: ExecutorParams = serde_json::from_str(params_json).context("invalid parameters JSON")?;
    let exchange = build_exchange(&config)?;

    let factory = ExecutorFactory::new(exchange, config.execution.clone());
    let mut executor = factory.create(type_name, params);
    let stop = executor.stop_handle();

    let finished = {
        let execution = executor.execute();
        tokio::pin!(execution);

        tokio::select! {
            state = &mut execution => Some(state),
            _ = tokio::signal::ctrl_c() => {
                log::warn!("중단 신호 수신");
                match &stop {
                    // TWAP 은 스스로 열린 주문을 정리하고 종료
                    Some(handle) => {
                        handle.stop();
                        Some(execution.await)
                    }
                    None => None,
                }
            }
        }
    };

    let state = match finished {
        Some(state) => state,
        None => executor.cancel_all().await,
    };

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
