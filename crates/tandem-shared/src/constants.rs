/// Application name
pub const APP_NAME: &str = "Tandem";

/// Joins the two sorted participant ids of a conversation key.
/// Never a legal identifier character.
pub const CONVERSATION_KEY_DELIMITER: char = '_';

/// Maximum message body length in characters
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Display-name snapshot used when neither a name nor an email is known
pub const FALLBACK_DISPLAY_NAME: &str = "Unknown";

/// Display name written to a new directory record without a name or email
pub const FALLBACK_PROFILE_NAME: &str = "Unknown User";

/// Provider recorded when the identity provider reports none
pub const DEFAULT_PROVIDER: &str = "google";

/// How long a pull-to-refresh keeps its directory subscription open
pub const DEFAULT_REFRESH_WINDOW_MS: u64 = 1000;

/// Field names used in store documents.
pub mod fields {
    pub const UID: &str = "uid";
    pub const DISPLAY_NAME: &str = "displayName";
    pub const EMAIL: &str = "email";
    pub const PHONE_NUMBER: &str = "phoneNumber";
    pub const PHOTO_URL: &str = "photoURL";
    pub const FCM_TOKEN: &str = "fcmToken";
    pub const PHONE_VERIFIED: &str = "phoneVerified";
    pub const LAST_LOGIN: &str = "lastLogin";
    pub const PROVIDERS: &str = "providers";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";

    pub const TEXT: &str = "text";
    pub const SENDER_ID: &str = "senderId";
    pub const SENDER_NAME: &str = "senderName";
    pub const TIMESTAMP: &str = "timestamp";
    pub const READ: &str = "read";

    pub const PARTICIPANTS: &str = "participants";
    pub const PARTICIPANT_NAMES: &str = "participantNames";
    pub const LAST_MESSAGE: &str = "lastMessage";
}
