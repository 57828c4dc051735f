//! 수집 캐스케이드.
//!
//! 비용 추정과 채널 선택은 I/O 없는 순수 함수입니다. 같은 입력이면
//! 반복 호출에도 같은 채널이 선택됩니다. 다운로드는 기간 단위로
//! 순차 실행되며, 범위 꼬리의 아카이브 누락(404)만 더 저렴한 채널로
//! 폴백합니다.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt};
use tracing::{info, instrument, warn};

use backtest_core::{Kline, Timeframe, TimeframeClass};

use crate::archive::{
    daily_archive_url, extract_klines, monthly_archive_url, next_month, year_month, StagingArea,
};
use crate::config::DataConfig;
use crate::error::{DataError, Result};
use crate::source::MarketDataSource;

// ==================== 요청 ====================

/// 캔들 수집 요청
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// 전략 워밍업용으로 시작 시점 이전에 추가로 가져올 캔들 수
    pub lookback_count: u32,
}

impl FetchRequest {
    /// lookback 만큼 과거로 확장된 시작 시점.
    /// 항상 `start − lookback_count × step` 이전이거나 같습니다.
    pub fn extended_start(&self) -> DateTime<Utc> {
        self.start - self.timeframe.step() * self.lookback_count as i32
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(DataError::InvalidRange("심볼이 비어 있음".to_string()));
        }
        if self.end <= self.start {
            return Err(DataError::InvalidRange(format!(
                "종료가 시작보다 빠름: start={} end={}",
                self.start, self.end
            )));
        }
        if self.end > now {
            return Err(DataError::InvalidRange(format!(
                "미래 범위는 조회 불가: end={}",
                self.end
            )));
        }
        Ok(())
    }
}

// ==================== 비용 추정 / 채널 선택 ====================

/// 채널별 예상 비용
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimate {
    /// 라이브 조회 호출 수 (1000행 페이지 단위)
    pub live_calls: u64,
    /// 일별 아카이브 파일 수
    pub daily_files: u64,
    /// 월별 아카이브 파일 수
    pub monthly_files: u64,
}

/// 수집 채널
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    LiveQuery,
    DailyFiles,
    MonthlyFiles,
}

/// 아카이브 기간 단위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivePeriod {
    Daily,
    Monthly,
}

/// 범위와 타임프레임만으로 비용을 추정합니다. I/O 없음.
pub fn estimate_cost(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    timeframe: Timeframe,
    page_limit: u32,
) -> CostEstimate {
    let duration_ms = (end - start).num_milliseconds().max(0) as u64;
    let step_ms = timeframe.step().num_milliseconds() as u64;
    let candles = duration_ms.div_ceil(step_ms);
    let live_calls = candles.div_ceil(page_limit as u64).max(1);

    let daily_files = ((end.date_naive() - start.date_naive()).num_days() + 1) as u64;

    let (sy, sm) = year_month(start.date_naive());
    let (ey, em) = year_month(end.date_naive());
    let monthly_files = ((ey - sy) * 12 + (em as i32 - sm as i32) + 1) as u64;

    CostEstimate {
        live_calls,
        daily_files,
        monthly_files,
    }
}

/// 비용 추정만 보고 채널을 결정합니다. I/O 없는 순수 함수이며
/// 같은 입력에 대해 항상 같은 결과를 냅니다.
pub fn select_method(
    class: TimeframeClass,
    estimate: &CostEstimate,
    config: &DataConfig,
) -> FetchMethod {
    let live_ok = estimate.live_calls <= config.max_live_calls
        && estimate.live_calls <= config.live_per_monthly_multiple * estimate.monthly_files;

    match class {
        TimeframeClass::Minute => {
            if live_ok {
                FetchMethod::LiveQuery
            } else if estimate.daily_files <= config.max_daily_files {
                FetchMethod::DailyFiles
            } else {
                FetchMethod::MonthlyFiles
            }
        }
        TimeframeClass::Intraday => {
            if live_ok {
                FetchMethod::LiveQuery
            } else {
                FetchMethod::MonthlyFiles
            }
        }
        TimeframeClass::Coarse => FetchMethod::LiveQuery,
    }
}

// ==================== 수집기 ====================

/// 아카이브 기간 슬롯 (시작 시점 + 다운로드 URL)
#[derive(Debug, Clone)]
struct PeriodSlot {
    start: DateTime<Utc>,
    url: String,
}

/// 캐스케이드 수집기
pub struct KlineFetcher<S: MarketDataSource> {
    source: S,
    config: DataConfig,
}

impl<S: MarketDataSource> KlineFetcher<S> {
    pub fn new(source: S, config: DataConfig) -> Self {
        Self { source, config }
    }

    /// 요청 범위(+lookback 확장)의 캔들을 close_time 오름차순,
    /// 중복 없이 반환합니다. 실패 시 부분 결과를 반환하지 않습니다.
    #[instrument(skip(self, request), fields(symbol = %request.symbol, tf = %request.timeframe))]
    pub async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Kline>> {
        request.validate(Utc::now())?;
        let ext_start = request.extended_start();
        let estimate = estimate_cost(
            ext_start,
            request.end,
            request.timeframe,
            self.config.page_limit,
        );
        let method = select_method(request.timeframe.class(), &estimate, &self.config);
        info!(
            live_calls = estimate.live_calls,
            daily_files = estimate.daily_files,
            monthly_files = estimate.monthly_files,
            ?method,
            "수집 채널 선택"
        );

        let klines = match method {
            FetchMethod::LiveQuery => {
                self.fetch_live(&request.symbol, request.timeframe, ext_start, request.end)
                    .await?
            }
            FetchMethod::DailyFiles => {
                self.fetch_archives(ArchivePeriod::Daily, request, ext_start)
                    .await?
            }
            FetchMethod::MonthlyFiles => {
                self.fetch_archives(ArchivePeriod::Monthly, request, ext_start)
                    .await?
            }
        };

        Ok(finalize(klines, ext_start, request.end))
    }

    /// 라이브 페이지 조회. 페이지가 가득 차면 다음 페이지로 전진합니다.
    async fn fetch_live(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>> {
        let limit = self.config.page_limit;
        let step = timeframe.step();
        let mut all = Vec::new();
        let mut cursor = start;

        while cursor < end {
            let page = self
                .source
                .fetch_page(symbol, timeframe, cursor, end, limit)
                .await?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            let last_open = match page.last() {
                Some(k) => k.open_time,
                None => break,
            };
            all.extend(page);
            if (page_len as u32) < limit {
                break;
            }
            cursor = last_open + step;
        }
        Ok(all)
    }

    /// 아카이브 다운로드 + 꼬리 404 폴백.
    ///
    /// BoxFuture 반환: 월별 → 일별 폴백이 재귀 호출이기 때문.
    fn fetch_archives<'a>(
        &'a self,
        period: ArchivePeriod,
        request: &'a FetchRequest,
        range_start: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<Vec<Kline>>> {
        async move {
            let slots = match period {
                ArchivePeriod::Daily => self.daily_slots(request, range_start)?,
                ArchivePeriod::Monthly => self.monthly_slots(request, range_start)?,
            };

            let staging = StagingArea::new()?;
            let downloaded = self.download_slots(&staging, &slots, request).await;
            // 정리 단계: 다운로드 성공/실패와 무관하게 실행
            staging.cleanup();
            let (mut klines, fallback_start) = downloaded?;

            if let Some(sub_start) = fallback_start {
                let fallback = match (period, request.timeframe.class()) {
                    // 일별 아카이브 누락 → 라이브 조회
                    (ArchivePeriod::Daily, _) => {
                        self.fetch_live(&request.symbol, request.timeframe, sub_start, request.end)
                            .await?
                    }
                    // 월별 아카이브 누락: 분 단위는 일별 파일로
                    (ArchivePeriod::Monthly, TimeframeClass::Minute) => {
                        self.fetch_archives(ArchivePeriod::Daily, request, sub_start)
                            .await?
                    }
                    // 그 외 타임프레임은 라이브 조회로
                    (ArchivePeriod::Monthly, _) => {
                        self.fetch_live(&request.symbol, request.timeframe, sub_start, request.end)
                            .await?
                    }
                };
                klines.extend(fallback);
            }
            Ok(klines)
        }
        .boxed()
    }

    /// 슬롯을 순서대로 다운로드합니다.
    ///
    /// 반환: (파싱된 캔들, 폴백 시작 시점). 폴백 시작 시점이 Some이면
    /// 꼬리 404가 발생한 것이고, 해당 기간 시작부터 요청 종료까지를
    /// 다른 채널로 가져와야 합니다.
    async fn download_slots(
        &self,
        staging: &StagingArea,
        slots: &[PeriodSlot],
        request: &FetchRequest,
    ) -> Result<(Vec<Kline>, Option<DateTime<Utc>>)> {
        let mut klines = Vec::new();
        for (i, slot) in slots.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.download_delay()).await;
            }
            match self.source.download_archive(&slot.url).await {
                Ok(bytes) => {
                    let file = slot.url.rsplit('/').next().unwrap_or("archive");
                    let stem = file.trim_end_matches(".zip");
                    klines.extend(extract_klines(
                        &bytes,
                        staging,
                        stem,
                        &self.config.exchange,
                        &request.symbol,
                        request.timeframe,
                    )?);
                }
                Err(e) if e.is_not_found() => {
                    let remaining = slots.len() - i;
                    if remaining <= self.config.trailing_fallback_periods {
                        warn!(
                            url = %slot.url,
                            remaining,
                            "범위 꼬리 아카이브 누락, 폴백 채널로 전환"
                        );
                        return Ok((klines, Some(slot.start)));
                    }
                    // 중간 누락은 폴백 없이 실패
                    return Err(DataError::ArchiveGap {
                        url: slot.url.clone(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok((klines, None))
    }

    fn daily_slots(&self, request: &FetchRequest, start: DateTime<Utc>) -> Result<Vec<PeriodSlot>> {
        let mut slots = Vec::new();
        let mut date = start.date_naive();
        let last = request.end.date_naive();
        while date <= last {
            slots.push(PeriodSlot {
                start: day_start(date)?,
                url: daily_archive_url(
                    &self.config.archive_base_url,
                    &request.symbol,
                    request.timeframe,
                    date,
                ),
            });
            date += Duration::days(1);
        }
        Ok(slots)
    }

    fn monthly_slots(
        &self,
        request: &FetchRequest,
        start: DateTime<Utc>,
    ) -> Result<Vec<PeriodSlot>> {
        let mut slots = Vec::new();
        let (mut year, mut month) = year_month(start.date_naive());
        let (end_year, end_month) = year_month(request.end.date_naive());
        while (year, month) <= (end_year, end_month) {
            let first = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| DataError::InvalidRange(format!("잘못된 월: {}-{}", year, month)))?;
            slots.push(PeriodSlot {
                start: day_start(first)?,
                url: monthly_archive_url(
                    &self.config.archive_base_url,
                    &request.symbol,
                    request.timeframe,
                    year,
                    month,
                ),
            });
            (year, month) = next_month(year, month);
        }
        Ok(slots)
    }
}

fn day_start(date: NaiveDate) -> Result<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| DataError::InvalidRange(format!("잘못된 날짜: {}", date)))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// 정렬, 중복 제거, 범위 트리밍
fn finalize(mut klines: Vec<Kline>, ext_start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Kline> {
    klines.sort_by_key(|k| k.close_time);
    klines.dedup_by_key(|k| k.close_time);
    klines.retain(|k| k.close_time >= ext_start && k.open_time <= end);
    klines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::zip_with_csv;
    use crate::retry::RetryConfig;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ==================== 모의 소스 ====================

    enum ArchiveReply {
        Bytes(Vec<u8>),
        Missing,
    }

    struct MockSource {
        /// fetch_page가 범위 필터링해 반환할 캔들 풀
        page_pool: Vec<Kline>,
        archives: HashMap<String, ArchiveReply>,
        calls: Mutex<Vec<String>>,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                page_pool: Vec::new(),
                archives: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn page_calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with("page:"))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl MarketDataSource for MockSource {
        async fn fetch_page(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            limit: u32,
        ) -> Result<Vec<Kline>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("page:{}:{}", start.timestamp_millis(), end.timestamp_millis()));
            let mut page: Vec<Kline> = self
                .page_pool
                .iter()
                .filter(|k| k.open_time >= start && k.open_time < end)
                .cloned()
                .collect();
            page.truncate(limit as usize);
            Ok(page)
        }

        async fn download_archive(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(format!("archive:{}", url));
            match self.archives.get(url) {
                Some(ArchiveReply::Bytes(bytes)) => Ok(bytes.clone()),
                Some(ArchiveReply::Missing) | None => Err(DataError::NotFound(url.to_string())),
            }
        }
    }

    // ==================== 픽스처 ====================

    fn test_config() -> DataConfig {
        DataConfig {
            download_delay_ms: 0,
            retry: RetryConfig::no_retry(),
            ..DataConfig::default()
        }
    }

    fn ts(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).single().unwrap()
    }

    const DAY_MS: i64 = 86_400_000;
    /// 2024-01-01 00:00:00 UTC
    const JAN1: i64 = 1_704_067_200_000;

    fn minute_kline(open_ms: i64) -> Kline {
        Kline {
            exchange: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::M1,
            open_time: ts(open_ms),
            close_time: ts(open_ms + 59_999),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume: dec!(1),
            quote_volume: None,
            num_trades: None,
        }
    }

    /// 하루치 일별 아카이브 zip (처음 `rows`분만 채움)
    fn daily_zip(day_start_ms: i64, rows: usize) -> Vec<u8> {
        let mut csv = String::new();
        for i in 0..rows {
            let open = day_start_ms + (i as i64) * 60_000;
            csv.push_str(&format!(
                "{},100,101,99,100.5,1,{},100,10\n",
                open,
                open + 59_999
            ));
        }
        zip_with_csv("day", &csv)
    }

    fn daily_url(config: &DataConfig, date: NaiveDate) -> String {
        daily_archive_url(&config.archive_base_url, "BTCUSDT", Timeframe::M1, date)
    }

    fn request_days(days: i64) -> FetchRequest {
        FetchRequest {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::M1,
            start: ts(JAN1),
            end: ts(JAN1 + days * DAY_MS - 1),
            lookback_count: 0,
        }
    }

    // ==================== 순수 함수 ====================

    #[test]
    fn test_extended_start() {
        let request = FetchRequest {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::H1,
            start: ts(JAN1),
            end: ts(JAN1 + DAY_MS),
            lookback_count: 24,
        };
        assert_eq!(request.extended_start(), ts(JAN1 - DAY_MS));
        // 확장 시작은 항상 start − lookback×step 이전이거나 같음
        assert!(request.extended_start() <= request.start - Duration::hours(24));
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let now = ts(JAN1 + 10 * DAY_MS);
        let mut request = request_days(2);
        request.end = request.start;
        assert!(matches!(
            request.validate(now),
            Err(DataError::InvalidRange(_))
        ));

        let mut request = request_days(2);
        request.end = now + Duration::days(1);
        assert!(matches!(
            request.validate(now),
            Err(DataError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_estimate_cost() {
        // 1분봉 3일 = 4320 캔들 → 1000행 페이지 5회
        let est = estimate_cost(ts(JAN1), ts(JAN1 + 3 * DAY_MS), Timeframe::M1, 1000);
        assert_eq!(est.live_calls, 5);
        assert_eq!(est.daily_files, 4); // 경계 포함 (1/1~1/4)
        assert_eq!(est.monthly_files, 1);

        // 1시간봉 2일 = 48 캔들 → 1회
        let est = estimate_cost(ts(JAN1), ts(JAN1 + 2 * DAY_MS), Timeframe::H1, 1000);
        assert_eq!(est.live_calls, 1);
    }

    #[test]
    fn test_select_method_rules() {
        let config = test_config();
        let est = |live, daily, monthly| CostEstimate {
            live_calls: live,
            daily_files: daily,
            monthly_files: monthly,
        };

        // 분 단위: 호출 수 적으면 라이브
        assert_eq!(
            select_method(TimeframeClass::Minute, &est(5, 3, 1), &config),
            FetchMethod::LiveQuery
        );
        // 호출 수 초과 → 일별
        assert_eq!(
            select_method(TimeframeClass::Minute, &est(12, 8, 1), &config),
            FetchMethod::DailyFiles
        );
        // 일별 파일도 초과 → 월별
        assert_eq!(
            select_method(TimeframeClass::Minute, &est(50, 35, 2), &config),
            FetchMethod::MonthlyFiles
        );
        // 월별 파일 수 대비 5배 규칙 위반 → 아카이브로
        assert_eq!(
            select_method(TimeframeClass::Minute, &est(8, 5, 1), &config),
            FetchMethod::DailyFiles
        );
        // 중간 단위는 일별을 건너뛰고 월별로
        assert_eq!(
            select_method(TimeframeClass::Intraday, &est(12, 8, 1), &config),
            FetchMethod::MonthlyFiles
        );
        // 굵은 단위는 항상 라이브
        assert_eq!(
            select_method(TimeframeClass::Coarse, &est(999, 999, 99), &config),
            FetchMethod::LiveQuery
        );
    }

    #[test]
    fn test_select_method_is_idempotent() {
        let config = test_config();
        let est = CostEstimate {
            live_calls: 12,
            daily_files: 8,
            monthly_files: 1,
        };
        let first = select_method(TimeframeClass::Minute, &est, &config);
        for _ in 0..10 {
            assert_eq!(select_method(TimeframeClass::Minute, &est, &config), first);
        }
    }

    // ==================== 아카이브 경로 ====================

    /// 일별 채널 강제: 라이브 호출 허용량 0
    fn daily_config() -> DataConfig {
        DataConfig {
            max_live_calls: 0,
            ..test_config()
        }
    }

    #[tokio::test]
    async fn test_two_day_daily_fetch_sorted_no_duplicates() {
        let config = daily_config();
        let mut source = MockSource::new();
        for day in 0..2 {
            let day_ms = JAN1 + day * DAY_MS;
            let date = ts(day_ms).date_naive();
            source.archives.insert(
                daily_url(&config, date),
                ArchiveReply::Bytes(daily_zip(day_ms, 5)),
            );
        }

        let fetcher = KlineFetcher::new(source, config);
        let klines = fetcher.fetch(&request_days(2)).await.unwrap();

        assert_eq!(klines.len(), 10);
        for pair in klines.windows(2) {
            assert!(pair[0].close_time < pair[1].close_time);
        }
    }

    #[tokio::test]
    async fn test_trailing_404_falls_back_to_live_once() {
        let config = daily_config();
        let mut source = MockSource::new();
        // 3일 중 앞 2일만 아카이브 존재
        for day in 0..2 {
            let day_ms = JAN1 + day * DAY_MS;
            source.archives.insert(
                daily_url(&config, ts(day_ms).date_naive()),
                ArchiveReply::Bytes(daily_zip(day_ms, 3)),
            );
        }
        let day3_ms = JAN1 + 2 * DAY_MS;
        for i in 0..3 {
            source.page_pool.push(minute_kline(day3_ms + i * 60_000));
        }

        let request = request_days(3);
        let fetcher = KlineFetcher::new(source, config);
        let klines = fetcher.fetch(&request).await.unwrap();

        // 폴백 호출은 정확히 1회, [누락 기간 시작, 요청 종료] 범위
        let page_calls = fetcher.source.page_calls();
        assert_eq!(page_calls.len(), 1);
        assert_eq!(
            page_calls[0],
            format!("page:{}:{}", day3_ms, request.end.timestamp_millis())
        );

        // [아카이브 결과..., 폴백 결과...] 순서 유지
        assert_eq!(klines.len(), 9);
        assert_eq!(klines[5].open_time, ts(JAN1 + DAY_MS + 2 * 60_000));
        assert_eq!(klines[6].open_time, ts(day3_ms));
    }

    #[tokio::test]
    async fn test_last_two_404s_fall_back_from_first_missing() {
        let config = daily_config();
        let mut source = MockSource::new();
        // 5일 중 앞 3일만 존재, 4~5일차 404
        for day in 0..3 {
            let day_ms = JAN1 + day * DAY_MS;
            source.archives.insert(
                daily_url(&config, ts(day_ms).date_naive()),
                ArchiveReply::Bytes(daily_zip(day_ms, 2)),
            );
        }
        let day4_ms = JAN1 + 3 * DAY_MS;
        source.page_pool.push(minute_kline(day4_ms));
        source.page_pool.push(minute_kline(day4_ms + DAY_MS));

        let request = request_days(5);
        let fetcher = KlineFetcher::new(source, config);
        let klines = fetcher.fetch(&request).await.unwrap();

        let page_calls = fetcher.source.page_calls();
        assert_eq!(page_calls.len(), 1);
        assert!(page_calls[0].starts_with(&format!("page:{}", day4_ms)));
        assert_eq!(klines.len(), 8);
    }

    #[tokio::test]
    async fn test_mid_range_404_is_hard_failure() {
        let config = daily_config();
        let mut source = MockSource::new();
        // 5일 중 2일차만 누락 → 남은 기간 4 > 폴백 허용 2
        for day in [0i64, 2, 3, 4] {
            let day_ms = JAN1 + day * DAY_MS;
            source.archives.insert(
                daily_url(&config, ts(day_ms).date_naive()),
                ArchiveReply::Bytes(daily_zip(day_ms, 2)),
            );
        }

        let fetcher = KlineFetcher::new(source, config);
        let err = fetcher.fetch(&request_days(5)).await.unwrap_err();

        assert!(matches!(err, DataError::ArchiveGap { .. }));
        // 폴백 호출 없음
        assert!(fetcher.source.page_calls().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_archive_aborts_without_fallback() {
        let config = daily_config();
        let mut source = MockSource::new();
        source.archives.insert(
            daily_url(&config, ts(JAN1).date_naive()),
            ArchiveReply::Bytes(vec![0, 1, 2, 3]),
        );

        let fetcher = KlineFetcher::new(source, config);
        let err = fetcher.fetch(&request_days(1)).await.unwrap_err();
        assert!(matches!(err, DataError::Parse(_)));
    }

    #[tokio::test]
    async fn test_monthly_intraday_falls_back_to_live() {
        // 시간봉 + 라이브 차단 → 월별 채널
        let config = DataConfig {
            max_live_calls: 0,
            download_delay_ms: 0,
            retry: RetryConfig::no_retry(),
            ..DataConfig::default()
        };
        let mut source = MockSource::new();
        // 1월 아카이브만 존재 (시간봉 하루치)
        let mut csv = String::new();
        for i in 0..24 {
            let open = JAN1 + i * 3_600_000;
            csv.push_str(&format!("{},100,101,99,100.5,1,{},100,10\n", open, open + 3_599_999));
        }
        source.archives.insert(
            monthly_archive_url(&config.archive_base_url, "BTCUSDT", Timeframe::H1, 2024, 1),
            ArchiveReply::Bytes(zip_with_csv("month", &csv)),
        );
        // 2월 404 → 라이브 폴백
        let feb1 = 1_706_745_600_000i64; // 2024-02-01
        source.page_pool.push(Kline {
            timeframe: Timeframe::H1,
            open_time: ts(feb1),
            close_time: ts(feb1 + 3_599_999),
            ..minute_kline(feb1)
        });

        let request = FetchRequest {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::H1,
            start: ts(JAN1),
            end: ts(feb1 + DAY_MS - 1),
            lookback_count: 0,
        };
        let fetcher = KlineFetcher::new(source, config);
        let klines = fetcher.fetch(&request).await.unwrap();

        assert_eq!(fetcher.source.page_calls().len(), 1);
        assert_eq!(klines.len(), 25);
    }

    #[tokio::test]
    async fn test_monthly_minute_falls_back_to_daily() {
        // 1분봉 + 라이브/일별 차단 → 월별 채널
        let config = DataConfig {
            max_live_calls: 0,
            max_daily_files: 0,
            download_delay_ms: 0,
            retry: RetryConfig::no_retry(),
            ..DataConfig::default()
        };
        let mut source = MockSource::new();
        // 1월 월별 아카이브 존재
        source.archives.insert(
            monthly_archive_url(&config.archive_base_url, "BTCUSDT", Timeframe::M1, 2024, 1),
            ArchiveReply::Bytes(daily_zip(JAN1, 3)),
        );
        // 2월 월별 404 → 일별 폴백 (2/1, 2/2 두 슬롯)
        let feb1 = 1_706_745_600_000i64;
        for day in 0..2 {
            let day_ms = feb1 + day * DAY_MS;
            source.archives.insert(
                daily_url(&config, ts(day_ms).date_naive()),
                ArchiveReply::Bytes(daily_zip(day_ms, 2)),
            );
        }

        let request = FetchRequest {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::M1,
            start: ts(JAN1),
            end: ts(feb1 + 2 * DAY_MS - 1),
            lookback_count: 0,
        };
        let fetcher = KlineFetcher::new(source, config);
        let klines = fetcher.fetch(&request).await.unwrap();

        // 라이브는 호출되지 않고 일별 채널로 내려감
        assert!(fetcher.source.page_calls().is_empty());
        assert_eq!(klines.len(), 7);
    }

    #[tokio::test]
    async fn test_live_paging_advances_cursor() {
        let config = DataConfig {
            page_limit: 3,
            download_delay_ms: 0,
            retry: RetryConfig::no_retry(),
            ..DataConfig::default()
        };
        let mut source = MockSource::new();
        for i in 0..7 {
            source.page_pool.push(minute_kline(JAN1 + i * 60_000));
        }

        let request = FetchRequest {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::M1,
            start: ts(JAN1),
            end: ts(JAN1 + 7 * 60_000),
            lookback_count: 0,
        };
        let fetcher = KlineFetcher::new(source, config);
        let klines = fetcher.fetch(&request).await.unwrap();

        assert_eq!(klines.len(), 7);
        // 3 + 3 + 1 페이지
        assert_eq!(fetcher.source.page_calls().len(), 3);
    }
}
