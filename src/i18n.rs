/*
Embedded message catalog for notification texts and user-facing errors.

- Two catalogs, KO (default) and EN, embedded as JSON at compile time.
- `tr` looks a key up for an explicit language and substitutes `{name}` placeholders.
- `t` / `t_with` use the process language chosen at startup with `set_language`.

Usage:
    use crate::i18n;
    let title = i18n::t("messages.reservation_confirmed.title");
    let body = i18n::t_with("messages.reminder.body", &[("venue", "Happy Vet"), ("hours", "3")]);

A key missing from the requested language falls back to KO, then to the key itself.
*/

use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_LANG: &str = "ko";

static TRANSLATIONS: OnceLock<HashMap<String, HashMap<String, String>>> = OnceLock::new();
static ACTIVE_LANG: OnceLock<String> = OnceLock::new();

const KO_JSON: &str = r#"
{
  "not_found.notification": "알림을 찾을 수 없습니다",
  "not_found.reservation": "예약을 찾을 수 없습니다",
  "not_found.venue": "시설을 찾을 수 없습니다",
  "not_found.doctor": "담당 수의사를 찾을 수 없습니다",
  "not_found.keyword_subscription": "키워드 구독을 찾을 수 없습니다",
  "not_found.member": "회원을 찾을 수 없습니다",
  "validation.notification_receiver_required": "알림 수신자가 필요합니다",
  "validation.notification_title_required": "알림 제목이 필요합니다",
  "validation.reserver_name_required": "예약자 이름을 입력해 주세요",
  "validation.reserver_phone_required": "예약자 연락처를 입력해 주세요",
  "validation.pet_name_required": "반려동물 이름을 입력해 주세요",
  "validation.venue_not_hospital": "병원 예약이 가능한 시설이 아닙니다",
  "validation.venue_not_hotel": "호텔 예약이 가능한 시설이 아닙니다",
  "validation.venue_inactive": "현재 예약을 받지 않는 시설입니다",
  "validation.doctor_unavailable": "선택한 수의사는 이 병원에서 예약할 수 없습니다",
  "validation.appointment_in_past": "지난 시간으로는 예약할 수 없습니다",
  "validation.check_in_in_past": "지난 날짜로는 체크인할 수 없습니다",
  "validation.check_out_not_after_check_in": "체크아웃은 체크인 다음 날 이후여야 합니다",
  "validation.keyword_required": "키워드를 입력해 주세요",
  "validation.keyword_too_long": "키워드는 {max}자 이하로 입력해 주세요",
  "validation.content_text_required": "본문이 비어 있습니다",
  "conflict.keyword_subscription_exists": "이미 구독 중인 키워드입니다",
  "transition.not_allowed": "{status} 상태의 예약은 {action} 처리할 수 없습니다",
  "transition.no_show_too_early": "예약 시간이 지나기 전에는 노쇼 처리할 수 없습니다",
  "transition.reminder_inactive": "{status} 상태의 예약에는 알림을 보내지 않습니다",
  "messages.reservation_accepted.title": "예약이 접수되었습니다",
  "messages.reservation_accepted.hospital_body": "{venue} {time} 진료 예약이 접수되었습니다. 병원 확정을 기다려 주세요.",
  "messages.reservation_accepted.hotel_body": "{venue} {check_in} ~ {check_out} 숙박 예약이 접수되었습니다. 호텔 확정을 기다려 주세요.",
  "messages.reservation_confirmed.title": "예약이 확정되었습니다",
  "messages.reservation_confirmed.body": "{venue} 예약({schedule})이 확정되었습니다.",
  "messages.reservation_rejected.title": "예약이 거절되었습니다",
  "messages.reservation_rejected.body": "{venue} 예약({schedule})이 거절되었습니다.",
  "messages.reservation_canceled.title": "예약이 취소되었습니다",
  "messages.reservation_canceled.body": "{venue} 예약({schedule})이 시설 사정으로 취소되었습니다.",
  "messages.reminder.title": "진료 {hours}시간 전입니다",
  "messages.reminder.body": "{venue} {time} 진료 예약이 있습니다. {pet}와 함께 늦지 않게 방문해 주세요.",
  "messages.keyword_match.title": "관심 키워드 '{keyword}' 새 글",
  "messages.keyword_match.body": "{excerpt}",
  "messages.comment.title": "{name}님이 내 글에 댓글을 남겼습니다",
  "messages.comment.body": "{excerpt}",
  "app.name": "펫 예약"
}
"#;

const EN_JSON: &str = r#"
{
  "not_found.notification": "Notification not found",
  "not_found.reservation": "Reservation not found",
  "not_found.venue": "Venue not found",
  "not_found.doctor": "Doctor not found",
  "not_found.keyword_subscription": "Keyword subscription not found",
  "not_found.member": "Member not found",
  "validation.notification_receiver_required": "Notification receiver is required",
  "validation.notification_title_required": "Notification title is required",
  "validation.reserver_name_required": "Reserver name is required",
  "validation.reserver_phone_required": "Reserver phone is required",
  "validation.pet_name_required": "Pet name is required",
  "validation.venue_not_hospital": "This venue does not take clinic appointments",
  "validation.venue_not_hotel": "This venue does not take hotel stays",
  "validation.venue_inactive": "This venue is not accepting reservations",
  "validation.doctor_unavailable": "The selected doctor cannot be booked at this venue",
  "validation.appointment_in_past": "Appointments cannot be made in the past",
  "validation.check_in_in_past": "Check-in cannot be in the past",
  "validation.check_out_not_after_check_in": "Check-out must be after check-in",
  "validation.keyword_required": "Keyword is required",
  "validation.keyword_too_long": "Keyword must be at most {max} characters",
  "validation.content_text_required": "Content text is empty",
  "conflict.keyword_subscription_exists": "You are already subscribed to this keyword",
  "transition.not_allowed": "Cannot {action} a reservation in status {status}",
  "transition.no_show_too_early": "A reservation cannot be marked as no-show before its time has passed",
  "transition.reminder_inactive": "No reminder is sent for a reservation in status {status}",
  "messages.reservation_accepted.title": "Reservation received",
  "messages.reservation_accepted.hospital_body": "Your appointment at {venue} on {time} was received and awaits confirmation.",
  "messages.reservation_accepted.hotel_body": "Your stay at {venue} from {check_in} to {check_out} was received and awaits confirmation.",
  "messages.reservation_confirmed.title": "Reservation confirmed",
  "messages.reservation_confirmed.body": "Your reservation at {venue} ({schedule}) is confirmed.",
  "messages.reservation_rejected.title": "Reservation declined",
  "messages.reservation_rejected.body": "Your reservation at {venue} ({schedule}) was declined.",
  "messages.reservation_canceled.title": "Reservation canceled",
  "messages.reservation_canceled.body": "Your reservation at {venue} ({schedule}) was canceled by the venue.",
  "messages.reminder.title": "Appointment in {hours} hours",
  "messages.reminder.body": "You have an appointment at {venue} on {time}. See you and {pet} soon!",
  "messages.keyword_match.title": "New post matching '{keyword}'",
  "messages.keyword_match.body": "{excerpt}",
  "messages.comment.title": "{name} commented on your post",
  "messages.comment.body": "{excerpt}",
  "app.name": "Pet Booking"
}
"#;

fn build_translations() -> HashMap<String, HashMap<String, String>> {
    let mut out: HashMap<String, HashMap<String, String>> = HashMap::new();

    let ko_map: HashMap<String, String> = serde_json::from_str(KO_JSON).unwrap_or_else(|e| {
        panic!("failed to parse KO_JSON in i18n module: {}", e);
    });
    out.insert("ko".to_string(), ko_map);

    let en_map: HashMap<String, String> = serde_json::from_str(EN_JSON).unwrap_or_else(|e| {
        panic!("failed to parse EN_JSON in i18n module: {}", e);
    });
    out.insert("en".to_string(), en_map);

    out
}

fn translations() -> &'static HashMap<String, HashMap<String, String>> {
    TRANSLATIONS.get_or_init(build_translations)
}

/// Normalize a language tag into a short, lowercase code (e.g. "en-US" -> "en").
pub fn normalize_language(lang: &str) -> String {
    lang.split('-').next().unwrap_or(lang).to_lowercase()
}

pub fn is_supported_language(lang: &str) -> bool {
    translations().contains_key(lang)
}

/// Choose the process language. Only the first call has an effect.
pub fn set_language(lang: &str) {
    let lang = normalize_language(lang);
    if !is_supported_language(&lang) {
        tracing::warn!("Unsupported language {}, keeping {}", lang, DEFAULT_LANG);
        return;
    }
    if ACTIVE_LANG.set(lang.clone()).is_err() {
        tracing::debug!("Language already set, ignoring {}", lang);
    }
}

pub fn active_language() -> &'static str {
    ACTIVE_LANG.get().map(String::as_str).unwrap_or(DEFAULT_LANG)
}

/// Translate `key` for `lang` (the active language if `None`), substituting `{name}` params.
pub fn tr(lang: Option<&str>, key: &str, params: Option<&[(&str, &str)]>) -> String {
    let map = translations();
    let desired = lang.unwrap_or_else(|| active_language());

    let val = map
        .get(desired)
        .and_then(|m| m.get(key))
        .or_else(|| map.get(DEFAULT_LANG).and_then(|m| m.get(key)))
        .cloned()
        .unwrap_or_else(|| key.to_string());

    match params {
        Some(params) => params.iter().fold(val, |s, (k, v)| {
            s.replace(&format!("{{{}}}", k), v)
        }),
        None => val,
    }
}

pub fn t(key: &str) -> String {
    tr(None, key, None)
}

pub fn t_with(key: &str, params: &[(&str, &str)]) -> String {
    tr(None, key, Some(params))
}
