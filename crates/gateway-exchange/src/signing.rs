//! 요청 서명 컨텍스트.
//!
//! 서명된 요청은 정렬된 `key=value` 쌍과 서버 동기화 타임스탬프를 `&`로
//! 이은 쿼리 문자열에 대해 HMAC-SHA256 서명을 계산하고, 그 16진수
//! 표현을 `signature` 파라미터로 덧붙입니다.
//!
//! HMAC 키 블록 처리는 상대적으로 비싸므로 초기화된 인스턴스를 한 번
//! 만들어 서명마다 복제합니다. 결과 서명은 매 호출마다 새로 생성하는
//! 구현과 바이트 단위로 동일합니다 (테스트 벡터로 검증).

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// 복제 가능한 서명 컨텍스트.
///
/// 동시 실행 단위마다 하나씩 소유할 수 있도록 `Clone`을 구현합니다.
#[derive(Clone)]
pub struct SigningContext {
    /// 시크릿으로 초기화된 HMAC 프로토타입
    mac: HmacSha256,
}

impl SigningContext {
    /// API 시크릿으로 서명 컨텍스트를 생성합니다.
    pub fn new(api_secret: &SecretString) -> Result<Self, GatewayError> {
        let mac = HmacSha256::new_from_slice(api_secret.expose_secret().as_bytes())
            .map_err(|e| GatewayError::Unauthorized(format!("Invalid API secret: {}", e)))?;
        Ok(Self { mac })
    }

    /// 쿼리 문자열을 서명하고 16진수 서명을 반환합니다.
    pub fn sign(&self, query: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// 파라미터 쌍에서 표준 쿼리 문자열을 생성합니다.
    ///
    /// 파라미터는 삽입 순서대로 인코딩됩니다. 서명은 정확히 이 바이트
    /// 순서에 대해 계산되므로 재정렬하면 안 됩니다.
    pub fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 타임스탬프와 수신 윈도우가 추가된 서명 완료 쿼리를 생성합니다.
    pub fn signed_query(
        &self,
        params: &[(&str, String)],
        timestamp_ms: u64,
        recv_window_ms: u64,
    ) -> String {
        let mut all_params = params.to_vec();
        all_params.push(("recvWindow", recv_window_ms.to_string()));
        all_params.push(("timestamp", timestamp_ms.to_string()));

        let query = Self::build_query(&all_params);
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext").finish_non_exhaustive()
    }
}
