//! Outbound API request description.

use reqwest::Method;
use serde_json::Value;

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document
    Json(Value),
    /// `application/x-www-form-urlencoded` pairs
    Form(Vec<(String, String)>),
}

/// One outbound call: method, endpoint relative to the client's base URL,
/// query parameters and optional body. Built once, then handed to
/// [`ApiClient::send`](crate::client::ApiClient::send).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    /// Create a request with the given method
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// GET request
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// POST request
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    /// Append a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Attach a JSON body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Attach a url-encoded form body
    pub fn form<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.body = Some(RequestBody::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::post("patent/")
            .param("apikey", "k")
            .param("limit", 5)
            .json(json!({"q": "x"}));

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.endpoint, "patent/");
        assert_eq!(
            request.query,
            vec![
                ("apikey".to_string(), "k".to_string()),
                ("limit".to_string(), "5".to_string())
            ]
        );
        assert_eq!(request.body, Some(RequestBody::Json(json!({"q": "x"}))));
    }

    #[test]
    fn test_form_body() {
        let request = ApiRequest::post("html/").form([("q", "rust")]);
        assert_eq!(
            request.body,
            Some(RequestBody::Form(vec![("q".to_string(), "rust".to_string())]))
        );
    }
}
