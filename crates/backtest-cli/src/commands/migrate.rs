//! 실행 레코드 스키마 마이그레이션.

use backtest_job::{JobConfig, PgJobStore};

pub async fn run_migrate() -> anyhow::Result<()> {
    let config = JobConfig::from_env()?;
    let store = PgJobStore::connect(&config.database_url).await?;
    store.ensure_schema().await?;
    println!("스키마 준비 완료: {}", mask(&config.database_url));
    Ok(())
}

/// 로그/출력용 URL 마스킹 (비밀번호 숨김)
fn mask(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((_, host)) => format!("postgres://***@{}", host),
        None => url.to_string(),
    }
}
