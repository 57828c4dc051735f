//! 과거 캔들 데이터 수집 계층.
//!
//! 요청 범위와 타임프레임을 보고 가장 저렴한 채널(라이브 페이지 조회 /
//! 일별 아카이브 / 월별 아카이브)을 선택해 캔들을 가져옵니다.
//!
//! # 동작 흐름
//!
//! ```text
//! FetchRequest (symbol, timeframe, range, lookback)
//!         │
//!         ▼
//! ┌─────────────────────┐
//! │ 1. 범위 검증/확장    │ ← lookback × step 만큼 과거로 확장
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ 2. 비용 추정 (순수)  │ ← 호출 수 / 일별 파일 수 / 월별 파일 수
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ 3. 채널 선택 (순수)  │ ← I/O 없음, 같은 입력이면 같은 결과
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ 4. 다운로드/조회     │ ← 꼬리 404는 더 저렴한 채널로 폴백
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ 5. 정렬/중복 제거    │ ← close_time 오름차순
//! └─────────────────────┘
//! ```

pub mod archive;
pub mod cascade;
pub mod config;
pub mod error;
pub mod retry;
pub mod source;

pub use cascade::{
    estimate_cost, select_method, ArchivePeriod, CostEstimate, FetchMethod, FetchRequest,
    KlineFetcher,
};
pub use config::DataConfig;
pub use error::{DataError, Result};
pub use retry::RetryConfig;
pub use source::{HttpKlineSource, MarketDataSource};
