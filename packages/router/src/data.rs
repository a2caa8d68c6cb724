//! The values loaders and actions receive and return.

use std::{
    fmt::{self, Debug, Display},
    future::Future,
    rc::Rc,
};

use futures_util::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use waymark_history::Path;

use crate::Params;

/// The HTTP-like method of a submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormMethod {
    /// A read. Get submissions are serialized into the search string.
    #[default]
    Get,
    /// A mutation.
    Post,
    /// A mutation.
    Put,
    /// A mutation.
    Patch,
    /// A mutation.
    Delete,
}

impl FormMethod {
    /// Whether submitting with this method runs an action.
    pub fn is_mutation(self) -> bool {
        !matches!(self, FormMethod::Get)
    }
}

impl Display for FormMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormMethod::Get => "GET",
            FormMethod::Post => "POST",
            FormMethod::Put => "PUT",
            FormMethod::Patch => "PATCH",
            FormMethod::Delete => "DELETE",
        })
    }
}

/// Ordered name/value pairs of a submitted form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormData(Vec<(String, String)>);

impl FormData {
    /// An empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field and return the form, for chaining.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name, value);
        self
    }

    /// Add a field. Names may repeat.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// The first value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a field, in submission order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Iterate over the fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Whether the form has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The form encoded as `application/x-www-form-urlencoded`, without a leading `?`.
    pub fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A form submitted by a navigation or a fetcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// The method of the submission.
    pub form_method: FormMethod,
    /// The path the form was submitted to, including the basename.
    pub form_action: String,
    /// The submitted fields.
    pub form_data: FormData,
}

/// The request a loader or action is called with.
#[derive(Clone, Debug, PartialEq)]
pub struct DataRequest {
    /// The location being loaded, including the basename.
    pub path: Path,
    /// The method. Loaders are always called with [`FormMethod::Get`].
    pub method: FormMethod,
    /// The submitted form, for actions.
    pub form_data: Option<FormData>,
}

impl DataRequest {
    /// The decoded search params of the request.
    pub fn search_params(&self) -> Vec<(String, String)> {
        form_urlencoded::parse(self.path.search.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect()
    }
}

/// What a loader or action receives.
#[derive(Clone, Debug, PartialEq)]
pub struct DataArgs {
    /// The request.
    pub request: DataRequest,
    /// The params of the match, including the params of every ancestor.
    pub params: Params,
}

/// A redirect requested by a loader or action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    /// Where to go. Relative locations resolve against the route that redirected.
    pub location: String,
    /// Replace the current history entry instead of pushing a new one.
    pub replace: bool,
    /// The status code. 307 and 308 keep the method of a submission.
    pub status: u16,
}

/// The successful result of a loader or action.
#[derive(Clone, Debug, PartialEq)]
pub enum DataOutcome {
    /// Data to store for the route.
    Data(Value),
    /// Go somewhere else instead.
    Redirect(Redirect),
}

impl DataOutcome {
    /// Serialize `value` into route data.
    pub fn json(value: impl Serialize) -> Result<Self, RouteError> {
        serde_json::to_value(value)
            .map(DataOutcome::Data)
            .map_err(|err| RouteError::from(anyhow::Error::from(err)))
    }

    /// A 302 redirect to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        DataOutcome::Redirect(Redirect {
            location: location.into(),
            replace: false,
            status: 302,
        })
    }

    /// A 302 redirect to `location` that replaces the current history entry.
    pub fn redirect_replace(location: impl Into<String>) -> Self {
        DataOutcome::Redirect(Redirect {
            location: location.into(),
            replace: true,
            status: 302,
        })
    }

    /// Whether this is a redirect.
    pub fn is_redirect(&self) -> bool {
        matches!(self, DataOutcome::Redirect(_))
    }
}

impl From<Value> for DataOutcome {
    fn from(value: Value) -> Self {
        DataOutcome::Data(value)
    }
}

/// An error response, the structured way for a loader or action to fail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// The status code.
    pub status: u16,
    /// The status text.
    pub status_text: String,
    /// Additional data.
    pub data: Value,
    /// Whether the router produced this error itself.
    #[serde(default)]
    pub internal: bool,
}

impl ErrorResponse {
    /// Create an error response.
    pub fn new(status: u16, status_text: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            data: data.into(),
            internal: false,
        }
    }

    pub(crate) fn not_found(pathname: &str) -> Self {
        Self {
            status: 404,
            status_text: String::from("Not Found"),
            data: Value::String(format!("No route matches URL \"{pathname}\"")),
            internal: true,
        }
    }

    pub(crate) fn method_not_allowed(method: FormMethod, pathname: &str, route_id: &str) -> Self {
        Self {
            status: 405,
            status_text: String::from("Method Not Allowed"),
            data: Value::String(format!(
                "You made a {method} request to \"{pathname}\" but did not provide an `action` \
                 for route \"{route_id}\", so there is no way to handle the request."
            )),
            internal: true,
        }
    }
}

impl Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.status_text)?;
        if let Value::String(message) = &self.data {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// What a loader or action fails with.
#[derive(Clone)]
pub enum RouteError {
    /// A structured error response.
    Response(ErrorResponse),
    /// Any other failure.
    Other(Rc<anyhow::Error>),
}

impl RouteError {
    /// The status of an error response.
    pub fn status(&self) -> Option<u16> {
        match self {
            RouteError::Response(response) => Some(response.status),
            RouteError::Other(_) => None,
        }
    }
}

impl Debug for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Response(response) => f.debug_tuple("Response").field(response).finish(),
            RouteError::Other(err) => f.debug_tuple("Other").field(&err.to_string()).finish(),
        }
    }
}

impl Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Response(response) => Display::fmt(response, f),
            RouteError::Other(err) => Display::fmt(err, f),
        }
    }
}

impl std::error::Error for RouteError {}

impl PartialEq for RouteError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RouteError::Response(a), RouteError::Response(b)) => a == b,
            (RouteError::Other(a), RouteError::Other(b)) => {
                Rc::ptr_eq(a, b) || a.to_string() == b.to_string()
            }
            _ => false,
        }
    }
}

impl From<anyhow::Error> for RouteError {
    fn from(err: anyhow::Error) -> Self {
        RouteError::Other(Rc::new(err))
    }
}

impl From<ErrorResponse> for RouteError {
    fn from(response: ErrorResponse) -> Self {
        RouteError::Response(response)
    }
}

/// What a loader or action resolves to.
pub type DataResult = Result<DataOutcome, RouteError>;

/// A loader or action.
pub type DataFunction = Rc<dyn Fn(DataArgs) -> LocalBoxFuture<'static, DataResult>>;

pub(crate) fn data_function<F, Fut>(f: F) -> DataFunction
where
    F: Fn(DataArgs) -> Fut + 'static,
    Fut: Future<Output = DataResult> + 'static,
{
    Rc::new(move |args| f(args).boxed_local())
}
