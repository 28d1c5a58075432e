//! 숫자 변환 헬퍼
//!
//! 실패하면 `None`을 돌려줍니다. 잘못된 레코드 하나 때문에
//! 전체 배치가 중단되지 않도록, 호출 측은 해당 필드를 생략합니다.

use serde_json::Value;

/// 실수 변환 (숫자 또는 숫자 문자열)
pub fn parse_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    parsed.is_finite().then_some(parsed)
}

/// 정수 변환
///
/// 숫자 실수는 소수점 이하를 버립니다. 문자열은 정수 표기만 허용합니다 ("4.5"는 실패).
pub fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            let f = n.as_f64()?;
            if f.is_finite() && f.abs() < i64::MAX as f64 {
                Some(f.trunc() as i64)
            } else {
                None
            }
        }
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
