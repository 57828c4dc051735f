//! 백테스트 실행 작업 계층.
//!
//! 실행 접수부터 워커 프로세스 감독, 결과 영속화까지를 담당합니다.
//!
//! # 동작 방식
//!
//! ```text
//! schedule ──▶ [JobStore] PENDING (전략당 활성 1건)
//!                  │
//! dispatch ──▶ RUNNING ──▶ 워커 프로세스 스폰 (하드 타임아웃)
//!                  │             │
//!                  │     수집 → 엔진 실행 → 진행률/로그 기록
//!                  │             │
//!                  └──▶ FINISHED | FAILED | TIMEOUT | INTERUPTED
//! ```
//!
//! 터미널 상태는 먼저 기록된 쪽이 이기므로 워커와 오케스트레이터가
//! 동시에 기록해도 안전합니다.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod store;
pub mod types;
pub mod worker;

pub use config::JobConfig;
pub use error::{JobError, Result};
pub use orchestrator::Orchestrator;
pub use store::{JobStore, MemoryJobStore, PgJobStore};
pub use types::{ExecutionRecord, JobFailure, JobParams, JobStatus, SmaParams};
pub use worker::run_worker;
