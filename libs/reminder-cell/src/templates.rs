use crate::models::ReminderStage;
use sms_cell::templates::render_template;

/// Bilingual reminder bodies per stage. Placeholders are filled at schedule
/// time (confirmation, 24h, 2h) or at send time (no_show) so the stored
/// message_content is always a rendered, ready-to-send string.
pub fn stage_template(stage: ReminderStage, language: &str) -> &'static str {
    match (stage, language) {
        (ReminderStage::Confirmation, "es") => {
            "Su cita con {practice_name} el {date} a las {time} esta confirmada! \
             Responda CANCELAR si necesita cancelar."
        }
        (ReminderStage::Confirmation, _) => {
            "Your appointment with {practice_name} on {date} at {time} is confirmed! \
             Reply CANCEL if you need to cancel."
        }
        (ReminderStage::DayBefore, "es") => {
            "Recordatorio: Tiene una cita con {practice_name} manana a las {time}. \
             Responda CONFIRMAR para confirmar o CANCELAR para cancelar."
        }
        (ReminderStage::DayBefore, _) => {
            "Reminder: You have an appointment with {practice_name} tomorrow at {time}. \
             Reply CONFIRM to confirm or CANCEL to cancel."
        }
        (ReminderStage::TwoHours, "es") => {
            "Su cita con {practice_name} es en 2 horas a las {time}. Nos vemos pronto!"
        }
        (ReminderStage::TwoHours, _) => {
            "Your appointment with {practice_name} is in 2 hours at {time}. See you soon!"
        }
        (ReminderStage::NoShow, "es") => {
            "Lo extranamos en {practice_name} hoy. \
             Desea reprogramar? Responda SI o llame al {phone}."
        }
        (ReminderStage::NoShow, _) => {
            "We missed you at {practice_name} today. \
             Would you like to reschedule? Reply YES or call {phone}."
        }
    }
}

pub fn render_stage(stage: ReminderStage, language: &str, variables: &[(&str, &str)]) -> String {
    render_template(stage_template(stage, language), variables)
}
