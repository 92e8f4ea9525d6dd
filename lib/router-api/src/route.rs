//! Route model
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named routing rule: `id: predicates -> filters -> backend`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Route identifier, unique within a route set
    pub id: String,

    /// Request matching conditions, all of which must hold
    #[serde(default)]
    pub predicates: Vec<Call>,

    /// Request/response filters applied in order
    #[serde(default)]
    pub filters: Vec<Call>,

    /// Where matching requests are sent
    pub backend: Backend,
}

/// A predicate or filter invocation, e.g. `Path("/api")`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Arg>,
}

/// Literal argument of a predicate or filter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    String(String),
    Number(f64),
}

/// Route backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Proxy to the given address
    Network(String),
    /// Answer from the filter chain without proxying
    Shunt,
}

impl Route {
    pub fn new(id: impl Into<String>, backend: Backend) -> Self {
        Self {
            id: id.into(),
            predicates: Vec::new(),
            filters: Vec::new(),
            backend,
        }
    }

    pub fn with_predicate(mut self, predicate: Call) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_filter(mut self, filter: Call) -> Self {
        self.filters.push(filter);
        self
    }

    /// Full definition including the id, e.g. `a: Path("/a") -> <shunt>`
    pub fn to_definition(&self) -> String {
        format!("{}: {}", self.id, self)
    }
}

/// Renders the route body without its id. This is the form stored
/// remotely; the id is carried by the key.
impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.predicates.is_empty() {
            f.write_str("*")?;
        } else {
            for (i, p) in self.predicates.iter().enumerate() {
                if i > 0 {
                    f.write_str(" && ")?;
                }
                write!(f, "{}", p)?;
            }
        }

        for filter in &self.filters {
            write!(f, " -> {}", filter)?;
        }

        write!(f, " -> {}", self.backend)
    }
}

impl Call {
    pub fn new(name: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::String(s.to_string())
    }
}

impl From<f64> for Arg {
    fn from(n: f64) -> Self {
        Arg::Number(n)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::String(s) => write_quoted(f, s),
            Arg::Number(n) => write!(f, "{}", n),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Network(address) => write_quoted(f, address),
            Backend::Shunt => f.write_str("<shunt>"),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_shunt_route() {
        let route = Route::new("a", Backend::Shunt)
            .with_predicate(Call::new("Path", vec!["/a".into()]));
        assert_eq!(route.to_string(), r#"Path("/a") -> <shunt>"#);
        assert_eq!(route.to_definition(), r#"a: Path("/a") -> <shunt>"#);
    }

    #[test]
    fn test_display_catch_all_with_filters() {
        let route = Route::new("api", Backend::Network("https://api.internal".to_string()))
            .with_filter(Call::new("setRequestHeader", vec!["X-Env".into(), "prod".into()]))
            .with_filter(Call::new("ratelimit", vec![20.0.into()]));
        assert_eq!(
            route.to_string(),
            r#"* -> setRequestHeader("X-Env", "prod") -> ratelimit(20) -> "https://api.internal""#
        );
    }

    #[test]
    fn test_display_escapes_quotes() {
        let call = Call::new("Header", vec![r#"say "hi" \o/"#.into()]);
        assert_eq!(call.to_string(), r#"Header("say \"hi\" \\o/")"#);
    }

    #[test]
    fn test_serde_shape() {
        let route = Route::new("b", Backend::Shunt)
            .with_predicate(Call::new("Method", vec!["GET".into()]));
        let json = serde_json::to_value(&route).unwrap();
        assert_eq!(json["id"], "b");
        assert_eq!(json["backend"], "shunt");
        assert_eq!(json["predicates"][0]["args"][0], "GET");
    }
}
