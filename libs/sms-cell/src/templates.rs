/// Default confirmation templates used when the practice has no custom
/// template map. Placeholders: {doctor}, {date}, {time}, {address},
/// {patient_name}, {phone}.
pub fn default_confirmation_template(language: &str) -> &'static str {
    match language {
        "es" => {
            "Su cita con {doctor} esta confirmada para el {date} a las {time}. \
             Direccion: {address}. Por favor traiga su tarjeta de seguro e \
             identificacion con foto. Para cancelar o reprogramar, llame al {phone}."
        }
        _ => {
            "Your appointment with {doctor} is confirmed for {date} at {time}. \
             Address: {address}. Please bring your insurance card and photo ID. \
             To cancel or reschedule, call {phone}."
        }
    }
}

/// Substitute {name} placeholders. A placeholder with no value stays as its
/// literal text so a template typo never breaks a send.
pub fn render_template(template: &str, variables: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        rendered = rendered.replace(&format!("{{{}}}", key), value);
    }
    rendered
}

/// Reminder bodies are capped at 2000 characters.
pub const MAX_SMS_BODY_CHARS: usize = 2000;

pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_SMS_BODY_CHARS {
        return body.to_string();
    }
    body.chars().take(MAX_SMS_BODY_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_placeholders() {
        let out = render_template(
            "Hi {patient_name}, see you on {date}.",
            &[("patient_name", "Jane Doe"), ("date", "Monday")],
        );
        assert_eq!(out, "Hi Jane Doe, see you on Monday.");
    }

    #[test]
    fn leaves_unknown_placeholders_literal() {
        let out = render_template("Hi {patient_name}, call {phone}.", &[("patient_name", "Jane")]);
        assert_eq!(out, "Hi Jane, call {phone}.");
    }

    #[test]
    fn truncates_oversized_bodies() {
        let long = "x".repeat(2500);
        assert_eq!(truncate_body(&long).chars().count(), MAX_SMS_BODY_CHARS);
    }
}
