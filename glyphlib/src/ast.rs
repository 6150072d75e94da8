//! Parsed program items handed to the compiler.
//!
//! The surface parser lives outside this crate; these types are the contract
//! it produces. They are serde-friendly so tools can feed routes as JSON.

use serde::{Deserialize, Serialize};

pub use crate::value::{BinaryOp, UnaryOp};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Route(Route),
    WebSocketRoute(WebSocketRoute),
    TypeDef(TypeDef),
    Function(Function),
    Command(Command),
    CronTask(CronTask),
    EventHandler(EventHandler),
    QueueWorker(QueueWorker),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub auth_type: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionKind {
    Database,
    Service,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Injection {
    pub name: String,
    pub kind: InjectionKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub injections: Vec<Injection>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSocketRoute {
    pub path: String,
    #[serde(default)]
    pub on_connect: Option<Vec<Stmt>>,
    #[serde(default)]
    pub on_message: Option<Vec<Stmt>>,
    #[serde(default)]
    pub on_disconnect: Option<Vec<Stmt>>,
    #[serde(default)]
    pub on_error: Option<Vec<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronTask {
    pub name: String,
    pub schedule: String,
    #[serde(default)]
    pub injections: Vec<Injection>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHandler {
    pub event_type: String,
    #[serde(default)]
    pub injections: Vec<Injection>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueWorker {
    pub queue_name: String,
    #[serde(default)]
    pub injections: Vec<Injection>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    /// `$ name = value`
    Declare { name: String, value: Expr },
    /// `name = value`
    Assign { name: String, value: Expr },
    /// `> value`
    Return { value: Expr },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        #[serde(default)]
        else_body: Vec<Stmt>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    For {
        #[serde(default)]
        key: Option<String>,
        value: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
        #[serde(default)]
        default: Vec<Stmt>,
    },
    Break,
    Continue,
    Expr { expr: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Literal { value: Value },
    Var { name: String },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Object { fields: Vec<(String, Expr)> },
    Array { items: Vec<Expr> },
    Field { object: Box<Expr>, field: String },
    Index { array: Box<Expr>, index: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
    Match { value: Box<Expr>, arms: Vec<MatchArm> },
    Async { body: Vec<Stmt> },
    Await { expr: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub pattern: Pattern,
    #[serde(default)]
    pub guard: Option<Expr>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    Literal { value: Value },
    Binding { name: String },
    Wildcard,
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal {
            value: value.into(),
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var { name: name.into() }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn object<K: Into<String>>(fields: Vec<(K, Expr)>) -> Self {
        Expr::Object {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Stmt {
    pub fn declare(name: impl Into<String>, value: Expr) -> Self {
        Stmt::Declare {
            name: name.into(),
            value,
        }
    }

    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            name: name.into(),
            value,
        }
    }

    pub fn ret(value: Expr) -> Self {
        Stmt::Return { value }
    }

    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr { expr }
    }
}

/// Names of `:param` segments in a route path, in order.
pub fn route_param_names(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix(':'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
