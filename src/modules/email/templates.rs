use chrono::Duration;

use crate::modules::utils::time::format_duration;

pub const RESET_EMAIL_SUBJECT: &str = "Password Reset Request";

/// Body of the password reset email
pub fn reset_email_body(token: &str, ttl: Duration) -> String {
    format!(
        "Hello,\n\n\
        A password reset was requested for your account.\n\n\
        To reset your password, use the following token:\n\n\
        {}\n\n\
        This token will expire in {}.\n\n\
        Security Tips:\n\
        - Choose a strong password with at least 8 characters\n\
        - Include uppercase and lowercase letters\n\
        - Include numbers and special characters\n\n\
        If you did not request this reset, please ignore this email and ensure \
        your account is secure.\n",
        token,
        format_duration(ttl.num_seconds().max(0) as u64)
    )
}
