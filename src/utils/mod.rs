//! 시간 관련 유틸리티
//!
//! 실행 스케줄 계산과 시간 변환 함수 제공

pub mod logging;
pub mod math;

use std::time::Duration;

/// 초 단위 실수를 Duration 으로 변환 (음수/NaN 은 0)
pub fn secs_to_duration(secs: f64) -> Duration {
  if secs.is_finite() && secs > 0.0 {
    Duration::from_secs_f64(secs)
  } else {
    Duration::ZERO
  }
}

/// 전체 기간을 균등 분할한 각 구간 시작 오프셋
pub fn calculate_time_slices(duration: Duration, num_slices: usize) -> Vec<Duration> {
  if num_slices == 0 {
    return Vec::new();
  }

  let interval = duration / num_slices as u32;
  (0..num_slices).map(|i| interval * i as u32).collect()
}
