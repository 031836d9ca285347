//! Filter criteria sent to the report endpoints, and the endpoint descriptions.

use crate::config::{DEFAULT_LOGIN_HLEVEL, DEFAULT_LOGIN_USERID};
use crate::error::{ReportError, Result};
use crate::utils::{format_report_date, month_to_date, parse_report_date};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Name of the division field in the request payload. Backends disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisionKey {
    #[default]
    Division,
    Div,
}

impl DivisionKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Division => "division",
            Self::Div => "div",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEndpoint {
    /// Path segment under the API domain, e.g. `location-wise-dispatch`.
    pub path: String,
    #[serde(default)]
    pub division_key: DivisionKey,
}

impl ReportEndpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            division_key: DivisionKey::Division,
        }
    }

    pub fn with_division_key(mut self, key: DivisionKey) -> Self {
        self.division_key = key;
        self
    }
}

/// Lookup lists served under `report-meta/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaLookup {
    SalesGroups,
    DocTypes,
    Divisions,
    Levels,
    Persons,
}

impl MetaLookup {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::SalesGroups => "get-sales-groups",
            Self::DocTypes => "get-doc-types",
            Self::Divisions => "get-divisions",
            Self::Levels => "get-levels",
            Self::Persons => "get-persons",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub date_from: String,
    pub date_to: String,
    #[serde(default)]
    pub division: String,
    #[serde(default)]
    pub sales_group: String,
    #[serde(default)]
    pub doc_type: String,
    #[serde(default)]
    pub login_div: String,
    #[serde(default)]
    pub login_userid: Option<String>,
    #[serde(default)]
    pub login_hlevel: Option<String>,
    #[serde(default)]
    pub include_sreturn: bool,
}

impl FilterCriteria {
    pub fn new(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            date_from: format_report_date(date_from),
            date_to: format_report_date(date_to),
            ..Self::default()
        }
    }

    /// First of the month through `today`.
    pub fn month_to_date(today: NaiveDate) -> Self {
        let (from, to) = month_to_date(today);
        Self::new(from, to)
    }

    pub fn with_division(mut self, division: impl Into<String>) -> Self {
        self.division = division.into();
        self
    }

    pub fn with_sales_group(mut self, sales_group: impl Into<String>) -> Self {
        self.sales_group = sales_group.into();
        self
    }

    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = doc_type.into();
        self
    }

    pub fn with_login(
        mut self,
        login_div: impl Into<String>,
        userid: impl Into<String>,
        hlevel: impl Into<String>,
    ) -> Self {
        self.login_div = login_div.into();
        self.login_userid = Some(userid.into());
        self.login_hlevel = Some(hlevel.into());
        self
    }

    pub fn including_sales_returns(mut self, include: bool) -> Self {
        self.include_sreturn = include;
        self
    }

    /// Checks the fields every report endpoint requires. Runs before any request.
    pub fn validate(&self) -> Result<(NaiveDate, NaiveDate)> {
        let from = parse_report_date("dateFrom", &self.date_from)?;
        let to = parse_report_date("dateTo", &self.date_to)?;

        if from > to {
            return Err(ReportError::validation(
                "dateTo",
                format!("{} is before dateFrom {}", to, from),
            ));
        }

        Ok((from, to))
    }

    /// The exact request body for a report-data or export call.
    pub fn to_payload(&self, division_key: DivisionKey) -> Value {
        let mut payload = self.login_fields();
        payload.insert("dateFrom".to_string(), json!(self.date_from.trim()));
        payload.insert("dateTo".to_string(), json!(self.date_to.trim()));
        payload.insert(division_key.as_str().to_string(), json!(self.division));
        payload.insert("salesGroup".to_string(), json!(self.sales_group));
        payload.insert("docType".to_string(), json!(self.doc_type));
        payload.insert("includeSreturn".to_string(), json!(self.include_sreturn));
        Value::Object(payload)
    }

    /// The body sent to lookup endpoints: login context plus the division.
    pub fn lookup_payload(&self) -> Value {
        let mut payload = self.login_fields();
        payload.insert("division".to_string(), json!(self.division));
        Value::Object(payload)
    }

    fn login_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("loginDiv".to_string(), json!(self.login_div));
        fields.insert(
            "loginUserid".to_string(),
            json!(self.login_userid.as_deref().unwrap_or(DEFAULT_LOGIN_USERID)),
        );
        fields.insert(
            "loginHlevel".to_string(),
            json!(self.login_hlevel.as_deref().unwrap_or(DEFAULT_LOGIN_HLEVEL)),
        );
        fields
    }

    /// Fills unset login fields from configured defaults.
    pub fn with_login_defaults(mut self, userid: &str, hlevel: &str) -> Self {
        if self.login_userid.is_none() {
            self.login_userid = Some(userid.to_string());
        }
        if self.login_hlevel.is_none() {
            self.login_hlevel = Some(hlevel.to_string());
        }
        self
    }
}
