/// Default capacity of the transport queue and every per-client queue.
pub const CHANNEL_SIZE: usize = 100;

/// Default conversation-cache TTL in minutes.
pub const CACHE_TTL_MINUTES: u64 = 1;

/// Every stored avatar path starts with this segment.
pub const AVATAR_PREFIX: &str = "/static/";

/// Timestamp format used on the wire (`createdAt`).
pub const WIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Consumer group name for the log transport.
pub const LOG_CONSUMER_GROUP: &str = "chat";

// Control frames and response messages. The deployed frontend matches on
// these exact strings, so they are part of the wire contract.

/// Sent directly to a client right after it is registered.
pub const WELCOME_TEXT: &str = "欢迎来到gochat聊天服务器";

/// Sent to a client when it is unregistered.
pub const GOODBYE_TEXT: &str = "已退出登录";

/// Sent to a sender whose frame was refused under transport overload.
pub const OVERLOAD_TEXT: &str = "由于目前同一时间过多用户发送消息，消息发送失败，请稍后重试";

/// Logout endpoint success message.
pub const LOGOUT_OK_TEXT: &str = "退出成功";

/// Generic internal-error message for HTTP responses.
pub const SYSTEM_ERROR_TEXT: &str = "系统错误，请联系工作人员";

/// Admission rejection when `client_id` is missing or empty.
pub const CLIENT_ID_MISSING_TEXT: &str = "clientId获取失败";
