use crate::config::Config;

/// One authentication cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// The logged-in session every request and page load replays.
///
/// Built once at startup and never mutated; components borrow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    cookies: Vec<SessionCookie>,
}

impl SessionContext {
    /// Session carrying only the `d` token.
    pub fn new(token: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            cookies: vec![SessionCookie {
                name: "d".to_string(),
                value: token.into(),
                domain: domain.into(),
            }],
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut session = Self::new(config.token.clone(), config.cookie_domain.clone());
        for (name, value) in &config.extra_cookies {
            session.cookies.push(SessionCookie {
                name: name.clone(),
                value: value.clone(),
                domain: config.cookie_domain.clone(),
            });
        }
        session
    }

    pub fn cookies(&self) -> &[SessionCookie] {
        &self.cookies
    }

    /// Value for the `Cookie` request header, e.g. `d=<token>;`.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={};", c.name, c.value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
