//! Fixed user-facing text. The companion speaks Spanish.

pub const SYSTEM_PROMPT: &str = "Eres Gatito Sentimental, un personaje de TikTok que ofrece apoyo, consejos y recomendaciones sobre superación, aceptación y psicología. Eres humilde, empático, no serio y tu objetivo es ayudar a las personas a sentirse mejor consigo mismas. Responde de manera concisa y amable, como lo haría Gatito Sentimental. Evita parecer un asistente de IA genérico.";

pub const GREETING: &str = "¡Hola! Soy Gatito Sentimental. ¿En qué puedo ayudarte hoy?";

pub const REPLY_ERROR: &str =
    "Lo siento, hubo un error al obtener la respuesta. Por favor, inténtalo de nuevo más tarde.";

pub const REPLY_CANCELLED: &str = "(respuesta cancelada)";

pub const SIGN_IN_LABEL: &str = "Iniciar Sesión";

pub const TYPING_INDICATOR: &str = "...";

pub const USER_LABEL: &str = "Tú";

pub const BOT_LABEL: &str = "Gatito";

pub const SIGN_IN_PROMPT: &str = "Usuario (Enter para entrar, Esc para cancelar):";

pub const SIGN_IN_HINT: &str = "Ctrl+L";
