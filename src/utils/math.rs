//! 수학 관련 유틸리티
//!
//! 거래소 단위 반올림, 범위 제한, 가중치 분배 함수 제공

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// f64 를 가장 짧은 십진 표현으로 변환
fn to_decimal(value: f64) -> Option<Decimal> {
  value.to_string().parse::<Decimal>().ok().or_else(|| Decimal::from_f64(value))
}

/// 값을 범위 내로 제한
pub fn clamp<T: PartialOrd>(value: T, min_value: T, max_value: T) -> T {
  if value < min_value {
    min_value
  } else if value > max_value {
    max_value
  } else {
    value
  }
}

/// 단위(step)의 배수로 내림. 십진 연산으로 처리해 0.1 같은 단위에서도 오차가 없다
pub fn floor_to_step(value: f64, step: f64) -> f64 {
  if !(step > 0.0) || !value.is_finite() {
    return value;
  }

  let floored = match (to_decimal(value), to_decimal(step)) {
    (Some(v), Some(s)) => v.checked_div(s).and_then(|q| q.floor().checked_mul(s)),
    _ => None,
  };

  // 십진 범위를 넘으면 부동소수 연산
  match floored.and_then(|d| d.normalize().to_f64()) {
    Some(result) => result,
    None => (value / step).floor() * step,
  }
}

/// 단위(step)의 배수로 올림
pub fn ceil_to_step(value: f64, step: f64) -> f64 {
  if !(step > 0.0) || !value.is_finite() {
    return value;
  }

  let ceiled = match (to_decimal(value), to_decimal(step)) {
    (Some(v), Some(s)) => v.checked_div(s).and_then(|q| q.ceil().checked_mul(s)),
    _ => None,
  };

  match ceiled.and_then(|d| d.normalize().to_f64()) {
    Some(result) => result,
    None => (value / step).ceil() * step,
  }
}

/// 십진 뺄셈 (부동소수 누적 오차 방지)
pub fn exact_sub(a: f64, b: f64) -> f64 {
  match (to_decimal(a), to_decimal(b)) {
    (Some(x), Some(y)) => x.checked_sub(y).and_then(|d| d.normalize().to_f64()).unwrap_or(a - b),
    _ => a - b,
  }
}

/// 십진 덧셈
pub fn exact_add(a: f64, b: f64) -> f64 {
  match (to_decimal(a), to_decimal(b)) {
    (Some(x), Some(y)) => x.checked_add(y).and_then(|d| d.normalize().to_f64()).unwrap_or(a + b),
    _ => a + b,
  }
}

/// 총량을 n 등분 (십진 나눗셈)
pub fn exact_div(total: f64, parts: usize) -> f64 {
  if parts == 0 {
    return 0.0;
  }
  match to_decimal(total) {
    Some(x) => x
      .checked_div(Decimal::from(parts as u64))
      .and_then(|d| d.to_f64())
      .unwrap_or(total / parts as f64),
    None => total / parts as f64,
  }
}

/// 값이 단위의 정수배인지 확인
pub fn is_multiple_of(value: f64, step: f64) -> bool {
  floor_to_step(value, step) == value
}

/// 가중치 비율대로 총량 분배 (반올림 전 원시값)
pub fn distribute(total: f64, weights: &[f64]) -> Vec<f64> {
  let sum: f64 = weights.iter().sum();
  if sum <= 0.0 {
    return vec![0.0; weights.len()];
  }
  weights.iter().map(|w| total * w / sum).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;
  use rust_decimal_macros::dec;

  #[test]
  fn test_clamp() {
    assert_eq!(clamp(5, 0, 10), 5);
    assert_eq!(clamp(-5, 0, 10), 0);
    assert_eq!(clamp(15, 0, 10), 10);
  }

  #[rstest]
  #[case(1.23456, 0.01, 1.23)]
  #[case(1.23456, 0.001, 1.234)]
  #[case(50123.45, 0.1, 50123.4)]
  #[case(50123.45, 10.0, 50120.0)]
  #[case(0.3, 0.1, 0.3)]
  #[case(0.25, 0.001, 0.25)]
  #[case(0.0009, 0.001, 0.0)]
  fn test_floor_to_step(#[case] value: f64, #[case] step: f64, #[case] expected: f64) {
    assert_eq!(floor_to_step(value, step), expected);
  }

  #[rstest]
  #[case(1e21, 1e-8)]
  #[case(5e28, 0.001)]
  #[case(1e30, 0.01)]
  fn test_huge_values_fall_back_to_float(#[case] value: f64, #[case] step: f64) {
    let floored = floor_to_step(value, step);
    let ceiled = ceil_to_step(value, step);

    assert!(floored.is_finite() && ceiled.is_finite());
    assert!((floored - value).abs() <= value * 1e-12);
    assert!((ceiled - value).abs() <= value * 1e-12);
  }

  #[test]
  fn test_huge_exact_arithmetic_does_not_overflow() {
    assert_eq!(exact_add(5e28, 5e28), 1e29);
    assert_eq!(exact_sub(-5e28, 5e28), -1e29);
    assert!((exact_div(7e28, 7) - 1e28).abs() <= 1e16);
  }

  #[test]
  fn test_floor_is_idempotent() {
    for raw in [0.0, 0.1234567, 1.0 / 3.0, 2.5, 99.999999, 12345.6789] {
      let once = floor_to_step(raw, 0.001);
      assert_eq!(floor_to_step(once, 0.001), once);
      assert!(once <= raw);
    }
  }

  #[test]
  fn test_ceil_and_zero_step() {
    assert_eq!(ceil_to_step(1.231, 0.01), 1.24);
    assert_eq!(ceil_to_step(1.23, 0.01), 1.23);
    assert_eq!(floor_to_step(1.2345, 0.0), 1.2345);
    assert!(is_multiple_of(0.75, 0.25));
    assert!(!is_multiple_of(0.7, 0.25));
  }

  #[test]
  fn test_exact_arithmetic() {
    assert_eq!(exact_sub(1.0, 0.333 + 0.333), 0.334);
    assert_eq!(exact_add(0.1, 0.2), 0.3);
    assert_eq!(exact_div(0.3, 3), 0.1);
    assert_eq!(exact_div(1.0, 0), 0.0);
  }

  #[test]
  fn test_decimal_conversion_is_exact() {
    assert_eq!(to_decimal(0.1), Some(dec!(0.1)));
    assert_eq!(to_decimal(50123.45), Some(dec!(50123.45)));
    assert_eq!(to_decimal(f64::NAN), None);
  }

  #[test]
  fn test_distribute() {
    let parts = distribute(2.0, &[1.0, 1.0, 1.0, 1.0]);
    assert_eq!(parts, vec![0.5, 0.5, 0.5, 0.5]);
    assert_eq!(distribute(1.0, &[0.0, 0.0]), vec![0.0, 0.0]);
  }
}
