//! 아카이브 파일 처리.
//!
//! 다운로드한 압축 파일을 스테이징 디렉터리에 풀고 행 단위로 캔들을
//! 파싱합니다. 파일은 호출 범위를 넘어 보존되지 않습니다. 스테이징
//! 디렉터리 제거는 수집이 실패해도 반드시 실행되는 정리 단계에서
//! 수행됩니다.

use chrono::{Datelike, NaiveDate};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempDir;
use tracing::{debug, warn};

use backtest_core::{Kline, Timeframe};

use crate::error::{DataError, Result};
use crate::source::timestamp_to_datetime;

// ==================== 스테이징 디렉터리 ====================

/// 아카이브 압축 해제용 임시 디렉터리.
///
/// [`StagingArea::cleanup`]으로 명시적으로 제거합니다. 호출이 누락돼도
/// Drop에서 제거를 시도합니다.
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("klines-").tempdir()?;
        debug!(path = %dir.path().display(), "스테이징 디렉터리 생성");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// 디렉터리와 내용물을 제거합니다.
    pub fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "스테이징 디렉터리 제거 실패");
        }
    }
}

// ==================== URL 구성 ====================

/// 일별 아카이브 URL: `{base}/data/spot/daily/klines/{SYM}/{tf}/{SYM}-{tf}-{date}.zip`
pub fn daily_archive_url(base: &str, symbol: &str, timeframe: Timeframe, date: NaiveDate) -> String {
    format!(
        "{}/data/spot/daily/klines/{}/{}/{}-{}-{}.zip",
        base,
        symbol,
        timeframe.as_str(),
        symbol,
        timeframe.as_str(),
        date.format("%Y-%m-%d")
    )
}

/// 월별 아카이브 URL: `{base}/data/spot/monthly/klines/{SYM}/{tf}/{SYM}-{tf}-{YYYY-MM}.zip`
pub fn monthly_archive_url(
    base: &str,
    symbol: &str,
    timeframe: Timeframe,
    year: i32,
    month: u32,
) -> String {
    format!(
        "{}/data/spot/monthly/klines/{}/{}/{}-{}-{:04}-{:02}.zip",
        base,
        symbol,
        timeframe.as_str(),
        symbol,
        timeframe.as_str(),
        year,
        month
    )
}

// ==================== 압축 해제 / 파싱 ====================

/// 압축 파일 바이트를 스테이징에 풀고 캔들로 파싱합니다.
pub fn extract_klines(
    bytes: &[u8],
    staging: &StagingArea,
    file_stem: &str,
    exchange: &str,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Vec<Kline>> {
    let zip_path = staging.path().join(format!("{}.zip", file_stem));
    fs::write(&zip_path, bytes)?;

    let file = fs::File::open(&zip_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| DataError::Parse(format!("압축 파일 열기 실패: {}", e)))?;

    let mut csv_paths: Vec<PathBuf> = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| DataError::Parse(format!("압축 엔트리 읽기 실패: {}", e)))?;
        if !entry.name().ends_with(".csv") {
            continue;
        }
        let out_path = staging.path().join(format!("{}-{}.csv", file_stem, i));
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        fs::write(&out_path, contents)?;
        csv_paths.push(out_path);
    }
    if csv_paths.is_empty() {
        return Err(DataError::Parse(format!(
            "압축 파일에 csv가 없음: {}",
            file_stem
        )));
    }

    let mut klines = Vec::new();
    for path in csv_paths {
        klines.extend(read_kline_csv(&path, exchange, symbol, timeframe)?);
    }
    Ok(klines)
}

/// csv 파일을 행 단위로 캔들로 읽습니다.
///
/// 열 형식: `open_time, open, high, low, close, volume, close_time,
/// quote_volume, count, ...`. 헤더 행은 첫 열이 숫자가 아니므로
/// 건너뜁니다.
pub fn read_kline_csv(
    path: &Path,
    exchange: &str,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Vec<Kline>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| DataError::Parse(format!("csv 열기 실패: {}", e)))?;

    let mut klines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DataError::Parse(format!("csv 행 읽기 실패: {}", e)))?;
        if record.len() < 7 {
            return Err(DataError::Parse(format!(
                "csv 행 필드 부족: {}개",
                record.len()
            )));
        }
        // 헤더 행 스킵
        let first = record.get(0).unwrap_or_default();
        if first.parse::<i64>().is_err() {
            continue;
        }

        let kline = Kline {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            timeframe,
            open_time: timestamp_to_datetime(field_i64(&record, 0)?)?,
            close_time: timestamp_to_datetime(field_i64(&record, 6)?)?,
            open: field_decimal(&record, 1)?,
            high: field_decimal(&record, 2)?,
            low: field_decimal(&record, 3)?,
            close: field_decimal(&record, 4)?,
            volume: field_decimal(&record, 5)?,
            quote_volume: match record.get(7) {
                Some(raw) if !raw.is_empty() => Some(field_decimal(&record, 7)?),
                _ => None,
            },
            num_trades: match record.get(8) {
                Some(raw) if !raw.is_empty() => Some(field_i64(&record, 8)?),
                _ => None,
            },
        };
        kline.validate()?;
        klines.push(kline);
    }
    Ok(klines)
}

fn field_i64(record: &csv::StringRecord, index: usize) -> Result<i64> {
    let raw = record
        .get(index)
        .ok_or_else(|| DataError::Parse(format!("csv {}번 필드 없음", index)))?;
    raw.parse()
        .map_err(|_| DataError::Parse(format!("csv {}번 필드 파싱 실패: {}", index, raw)))
}

fn field_decimal(record: &csv::StringRecord, index: usize) -> Result<Decimal> {
    let raw = record
        .get(index)
        .ok_or_else(|| DataError::Parse(format!("csv {}번 필드 없음", index)))?;
    Decimal::from_str(raw)
        .map_err(|_| DataError::Parse(format!("csv {}번 필드 파싱 실패: {}", index, raw)))
}

/// `date`가 속한 달의 다음 달 1일
pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// 날짜가 속한 (년, 월)
pub fn year_month(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}
