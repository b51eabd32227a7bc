//! Appointment listing.

use std::fmt::Write as _;

use crate::scheduling::{Record, SchedulingSchema};

/// Appointment types that are not real appointments.
const IGNORED_TYPES: [&str; 3] = ["Eliminada", "Bloqueada", "No Viene"];

/// Activities booked on a doctor's agenda that are not patient visits.
const IGNORED_ACTIVITIES: [&str; 3] = ["RECORDATORIO", "VISITADOR MÉDICO", "LABORATORIO"];

fn is_listed(record: &Record, schema: &SchedulingSchema) -> bool {
    let kind = record.field_str(&schema.agenda_type_field);
    let activity = record.field_str(&schema.agenda_activity_field).trim().to_uppercase();
    !IGNORED_TYPES.contains(&kind) && !IGNORED_ACTIVITIES.contains(&activity.as_str())
}

/// "HH:MM" from "HH:MM:SS".
fn short_time(time: &str) -> String {
    time.split(':').take(2).collect::<Vec<_>>().join(":")
}

/// Render a doctor's appointments; `when` reads "hoy" or "el 05-02-2026".
///
/// Field names come from `schema`. The type and activity values filtered out
/// are fixed.
pub fn format_agenda(
    records: &[Record],
    schema: &SchedulingSchema,
    doctor_name: &str,
    when: &str,
) -> String {
    if records.is_empty() {
        return format!("No hay citas agendadas para {when}.");
    }

    let mut listed: Vec<&Record> = records.iter().filter(|r| is_listed(r, schema)).collect();
    if listed.is_empty() {
        return format!("*{doctor_name}*, no tienes citas agendadas {when}.");
    }
    let time_field = schema.agenda_time_field.as_str();
    listed.sort_by(|a, b| a.field_str(time_field).cmp(b.field_str(time_field)));

    let mut msg = format!("*Hola {doctor_name}*\nAgenda para {when}:\n\n");
    for record in listed {
        let patient = format!(
            "{} {}",
            record.field_str(&schema.patient_first_name_field).trim(),
            record.field_str(&schema.patient_last_name_field).trim()
        );
        let patient = match patient.trim() {
            "" => "Sin paciente",
            name => name,
        };
        let activity = match record.field_str(&schema.agenda_activity_field) {
            "" => "Sin motivo",
            activity => activity,
        };
        let kind = record.field_str(&schema.agenda_type_field);
        let linked = if kind.eq_ignore_ascii_case("conjunto") {
            " 🔗"
        } else {
            ""
        };

        let _ = writeln!(msg, "⏰ *{}* — {patient}", short_time(record.field_str(time_field)));
        let _ = writeln!(msg, "📋 {activity}{linked}");
    }
    msg
}
