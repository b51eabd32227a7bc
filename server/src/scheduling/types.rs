//! Scheduling Database Types
//!
//! Records, find queries and the field mapping of the clinic's current
//! scheduling schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One record returned by a find request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "recordId", default)]
    pub record_id: String,
    #[serde(rename = "fieldData", default)]
    pub field_data: Map<String, Value>,
}

impl Record {
    /// String value of a field; missing or non-string fields read as "".
    pub fn field_str(&self, field: &str) -> &str {
        self.field_data
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Field value rendered as text, including numeric fields.
    pub fn field_text(&self, field: &str) -> Option<String> {
        match self.field_data.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A session token issued by the scheduling database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
struct FindRequest {
    criteria: Vec<(String, String)>,
    omit: bool,
}

/// Structured find query: each request is a set of equality predicates;
/// omit requests remove their matches from the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    requests: Vec<FindRequest>,
}

impl FindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request matching records where every field equals its value.
    pub fn matching<K, V>(mut self, criteria: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.requests.push(FindRequest {
            criteria: criteria
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            omit: false,
        });
        self
    }

    /// Add a request removing records where `field` equals `value`.
    pub fn omitting(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.requests.push(FindRequest {
            criteria: vec![(field.into(), value.into())],
            omit: true,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requests.iter().all(|r| r.omit)
    }

    /// Wire body for the `_find` endpoint.
    pub fn to_body(&self) -> Value {
        let query: Vec<Value> = self
            .requests
            .iter()
            .map(|request| {
                let mut object: Map<String, Value> = request
                    .criteria
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                if request.omit {
                    object.insert("omit".into(), Value::String("true".into()));
                }
                Value::Object(object)
            })
            .collect();
        json!({ "query": query })
    }
}

/// Layouts and field names of the scheduling database.
///
/// The database schema has changed over time, so every name used in a query
/// is configuration rather than a constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingSchema {
    /// Staff directory layout
    pub auth_layout: String,
    /// Appointment listing layout
    pub agenda_layout: String,
    /// Message thread layout
    pub messages_layout: String,
    /// Phone field on the staff layout
    pub staff_phone_field: String,
    pub staff_id_field: String,
    pub staff_name_field: String,
    pub staff_role_field: String,
    /// Staff phone field on the appointment layout
    pub agenda_phone_field: String,
    pub agenda_date_field: String,
    /// Appointment types removed by the query itself
    pub agenda_omit_types: Vec<String>,
    pub agenda_type_field: String,
    /// Appointment start time, "HH:MM:SS"
    pub agenda_time_field: String,
    pub agenda_activity_field: String,
    /// Patient name fields reached through the appointment's relationship
    pub patient_first_name_field: String,
    pub patient_last_name_field: String,
    /// Staff phone field on the message thread layout
    pub messages_phone_field: String,
    /// Field holding a whole message thread
    pub messages_text_field: String,
    /// `chrono` format of dates in queries
    pub date_format: String,
    /// Prefix prepended to sender phones in queries
    pub phone_prefix: String,
    /// Use the database's exact-match operator for phone lookups
    pub exact_phone_match: bool,
}

impl Default for SchedulingSchema {
    fn default() -> Self {
        Self {
            auth_layout: "AuthUsuarios_dapi".into(),
            agenda_layout: "ListadoDeHoras_dapi".into(),
            messages_layout: "Recados_dapi".into(),
            staff_phone_field: "Telefono".into(),
            staff_id_field: "id_RecursoHumano".into(),
            staff_name_field: "Nombre Lista".into(),
            staff_role_field: "Rol".into(),
            agenda_phone_field: "Recurso Humano::Telefono".into(),
            agenda_date_field: "Fecha".into(),
            agenda_omit_types: vec!["Eliminada".into()],
            agenda_type_field: "Tipo".into(),
            agenda_time_field: "Hora".into(),
            agenda_activity_field: "Actividad".into(),
            patient_first_name_field: "Pacientes::NOMBRE".into(),
            patient_last_name_field: "Pacientes::APELLIDO PATERNO".into(),
            messages_phone_field: "Recurso Humano::Telefono".into(),
            messages_text_field: "texto_Recado".into(),
            date_format: "%m/%d/%Y".into(),
            phone_prefix: "+".into(),
            exact_phone_match: false,
        }
    }
}

impl SchedulingSchema {
    /// Query value for a sender phone.
    pub fn phone_value(&self, phone: &str) -> String {
        let phone = phone.trim().trim_start_matches('+');
        if self.exact_phone_match {
            format!("=={}{phone}", self.phone_prefix)
        } else {
            format!("{}{phone}", self.phone_prefix)
        }
    }
}
