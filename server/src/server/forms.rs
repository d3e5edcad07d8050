//! Request bodies and their field checks

use async_trait::async_trait;
use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::str::FromStr;

use super::error::{ApiError, FieldError, INVALID_VALUE};
use crate::session::TransferRequest;

/// Body accepted either as `application/json` or as a urlencoded form.
/// A request without a content type yields `T::default()`.
pub struct FormOrJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for FormOrJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let malformed =
            |msg: String| ApiError::Validation(vec![FieldError::body("body", None, msg)]);

        match content_type {
            None => Ok(Self(T::default())),
            Some(ct) if ct.starts_with("application/json") => {
                let Json(value) = Json::<T>::from_request(req, state)
                    .await
                    .map_err(|e| malformed(e.body_text()))?;
                Ok(Self(value))
            }
            Some(_) => {
                let Form(value) = Form::<T>::from_request(req, state)
                    .await
                    .map_err(|e| malformed(e.body_text()))?;
                Ok(Self(value))
            }
        }
    }
}

/// Body of `POST /inquire-for-transfer-money`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferForm {
    pub amount: Option<Value>,
    pub to_account: Option<Value>,
    pub to_bank_code: Option<Value>,
}

/// Smallest amount accepted for a transfer
fn minimum_amount() -> Decimal {
    Decimal::new(1, 2)
}

impl TransferForm {
    /// Destination bank code, when present as a string
    pub fn bank_code(&self) -> Option<&str> {
        self.to_bank_code.as_ref().and_then(Value::as_str)
    }

    /// Run the checks that need no backend access.
    ///
    /// Every field is checked; a field reports only its first failure.
    pub fn parse(&self) -> Result<TransferRequest, Vec<FieldError>> {
        let mut errors = Vec::new();

        let amount = match &self.amount {
            None => {
                errors.push(FieldError::body("amount", None, INVALID_VALUE));
                None
            }
            Some(raw) => match parse_amount(raw) {
                Some(amount) if amount >= minimum_amount() => Some(amount),
                _ => {
                    errors.push(FieldError::body("amount", Some(raw.clone()), INVALID_VALUE));
                    None
                }
            },
        };

        let to_account = match self.to_account.as_ref().and_then(scalar_text) {
            Some(account) => Some(account),
            None => {
                errors.push(FieldError::body(
                    "toAccount",
                    self.to_account.clone(),
                    INVALID_VALUE,
                ));
                None
            }
        };

        let to_bank_code = match self.bank_code() {
            Some(code) => Some(code.to_string()),
            None => {
                errors.push(FieldError::body(
                    "toBankCode",
                    self.to_bank_code.clone(),
                    INVALID_VALUE,
                ));
                None
            }
        };

        match (amount, to_account, to_bank_code) {
            (Some(amount), Some(to_account), Some(to_bank_code)) if errors.is_empty() => {
                Ok(TransferRequest {
                    to_account,
                    amount,
                    to_bank_code,
                })
            }
            _ => Err(errors),
        }
    }
}

fn parse_amount(raw: &Value) -> Option<Decimal> {
    match raw {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn form(amount: Value, to_account: Value, to_bank_code: Value) -> TransferForm {
        TransferForm {
            amount: Some(amount),
            to_account: Some(to_account),
            to_bank_code: Some(to_bank_code),
        }
    }

    #[test]
    fn test_valid_form() {
        let request = form(json!("100.00"), json!("1234567890"), json!("KBANK"))
            .parse()
            .unwrap();

        assert_eq!(request.amount, dec!(100.00));
        assert_eq!(request.to_account, "1234567890");
        assert_eq!(request.to_bank_code, "KBANK");
    }

    #[test]
    fn test_numeric_amount_and_account() {
        let request = form(json!(0.01), json!(1234567890u64), json!("SCB"))
            .parse()
            .unwrap();

        assert_eq!(request.amount, dec!(0.01));
        assert_eq!(request.to_account, "1234567890");
    }

    #[test]
    fn test_amount_below_minimum() {
        for amount in [json!("0.009"), json!("0"), json!("-5"), json!("ten")] {
            let errors = form(amount.clone(), json!("1"), json!("KBANK"))
                .parse()
                .unwrap_err();
            assert_eq!(errors.len(), 1, "amount {} should be rejected", amount);
            assert_eq!(errors[0].param, "amount");
            assert_eq!(errors[0].value, Some(amount));
        }
    }

    #[test]
    fn test_empty_form_reports_every_field() {
        let errors = TransferForm::default().parse().unwrap_err();
        let params: Vec<&str> = errors.iter().map(|e| e.param.as_str()).collect();

        assert_eq!(params, vec!["amount", "toAccount", "toBankCode"]);
        assert!(errors.iter().all(|e| e.value.is_none()));
    }

    #[test]
    fn test_form_deserializes_camel_case() {
        let parsed: TransferForm = serde_json::from_value(json!({
            "amount": "12.50",
            "toAccount": "555",
            "toBankCode": "BBL"
        }))
        .unwrap();

        assert_eq!(parsed.bank_code(), Some("BBL"));
        assert_eq!(parsed.parse().unwrap().amount, dec!(12.50));
    }
}
