//! 백테스트 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 캔들 수집 후 CSV 저장
//! backtest fetch -s BTCUSDT -i 1h -f 2024-01-01 -t 2024-03-01 -o klines.csv
//!
//! # 로컬에서 즉시 백테스트
//! backtest run -s BTCUSDT -i 1h -f 2024-01-01 -t 2024-03-01 --capital 10000
//!
//! # 저장소에 실행을 접수하고 워커 프로세스로 수행
//! backtest schedule --strategy-id sma-btc -s BTCUSDT -i 1h -f 2024-01-01 -t 2024-03-01
//!
//! # 실행 레코드 스키마 생성
//! backtest migrate
//! ```

use clap::{Parser, Subcommand};
use uuid::Uuid;

mod commands;

use commands::{
    fetch::{run_fetch, FetchArgs},
    migrate::run_migrate,
    run::{run_backtest, RunArgs},
    schedule::{run_schedule, ScheduleArgs},
    worker::run_worker_command,
};

#[derive(Parser)]
#[command(name = "backtest")]
#[command(about = "백테스트 실행 엔진 - 캔들 수집/시뮬레이션/작업 오케스트레이션", long_about = None)]
#[command(version)]
struct Cli {
    /// 로그 레벨 (RUST_LOG 환경변수가 우선)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 캔들 수집 (아카이브/라이브 캐스케이드)
    Fetch {
        /// 심볼 (예: BTCUSDT)
        #[arg(short, long)]
        symbol: String,

        /// 타임프레임 (1m, 5m, 1h, 4h, 1d, ...)
        #[arg(short = 'i', long, default_value = "1h")]
        timeframe: String,

        /// 시작 날짜 (YYYY-MM-DD)
        #[arg(short = 'f', long)]
        from: String,

        /// 종료 날짜 (YYYY-MM-DD)
        #[arg(short, long)]
        to: String,

        /// CSV 출력 파일 경로 (지정하지 않으면 요약만 출력)
        #[arg(short, long)]
        output: Option<String>,

        /// 범위 앞에 추가로 수집할 캔들 수
        #[arg(long, default_value = "0")]
        lookback: u32,
    },

    /// 백테스트 즉시 실행 (저장소 불필요)
    Run {
        /// 심볼 (예: BTCUSDT)
        #[arg(short, long)]
        symbol: String,

        /// 타임프레임 (1m, 5m, 1h, 4h, 1d, ...)
        #[arg(short = 'i', long, default_value = "1h")]
        timeframe: String,

        /// 시작 날짜 (YYYY-MM-DD)
        #[arg(short = 'f', long)]
        from: String,

        /// 종료 날짜 (YYYY-MM-DD)
        #[arg(short, long)]
        to: String,

        /// 초기 자본
        #[arg(long, default_value = "10000")]
        capital: String,

        /// SMA 단기 기간
        #[arg(long, default_value = "10")]
        fast: usize,

        /// SMA 장기 기간
        #[arg(long, default_value = "30")]
        slow: usize,

        /// 결과 리포트 JSON 저장 경로
        #[arg(short, long)]
        output: Option<String>,
    },

    /// 실행 접수 후 워커 프로세스로 수행 (저장소 필요)
    Schedule {
        /// 전략 식별자 (활성 실행 1건 제한의 키)
        #[arg(long)]
        strategy_id: String,

        /// 심볼 (예: BTCUSDT)
        #[arg(short, long)]
        symbol: String,

        /// 타임프레임 (1m, 5m, 1h, 4h, 1d, ...)
        #[arg(short = 'i', long, default_value = "1h")]
        timeframe: String,

        /// 시작 날짜 (YYYY-MM-DD)
        #[arg(short = 'f', long)]
        from: String,

        /// 종료 날짜 (YYYY-MM-DD)
        #[arg(short, long)]
        to: String,

        /// 초기 자본
        #[arg(long, default_value = "10000")]
        capital: String,

        /// SMA 단기 기간
        #[arg(long, default_value = "10")]
        fast: usize,

        /// SMA 장기 기간
        #[arg(long, default_value = "30")]
        slow: usize,
    },

    /// 워커 모드 (오케스트레이터가 스폰, 직접 실행 비권장)
    Worker {
        /// 처리할 실행 레코드 ID
        #[arg(long)]
        execution_id: Uuid,
    },

    /// 실행 레코드 스키마 생성 (멱등)
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (없어도 에러 안남)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Fetch {
            symbol,
            timeframe,
            from,
            to,
            output,
            lookback,
        } => {
            run_fetch(FetchArgs {
                symbol,
                timeframe,
                from,
                to,
                output,
                lookback,
            })
            .await
        }
        Commands::Run {
            symbol,
            timeframe,
            from,
            to,
            capital,
            fast,
            slow,
            output,
        } => {
            run_backtest(RunArgs {
                symbol,
                timeframe,
                from,
                to,
                capital,
                fast,
                slow,
                output,
            })
            .await
        }
        Commands::Schedule {
            strategy_id,
            symbol,
            timeframe,
            from,
            to,
            capital,
            fast,
            slow,
        } => {
            run_schedule(ScheduleArgs {
                strategy_id,
                symbol,
                timeframe,
                from,
                to,
                capital,
                fast,
                slow,
            })
            .await
        }
        Commands::Worker { execution_id } => run_worker_command(execution_id).await,
        Commands::Migrate => run_migrate().await,
    }
}
