//! Static localisation tables (Uzbek default, Russian, English)
//!
//! Texts are MarkdownV2-ready: reserved characters are already escaped.
//! Placeholders use `{name}` syntax and are filled by the presenter.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported interface languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    /// Uzbek
    #[default]
    Uz,
    /// Russian
    Ru,
    /// English
    En,
}

impl Lang {
    /// All languages in menu order
    pub const ALL: [Lang; 3] = [Lang::Uz, Lang::Ru, Lang::En];

    /// ISO code
    pub fn code(&self) -> &'static str {
        match self {
            Lang::Uz => "uz",
            Lang::Ru => "ru",
            Lang::En => "en",
        }
    }

    /// Native name with flag for the language picker
    pub fn label(&self) -> &'static str {
        match self {
            Lang::Uz => "🇺🇿 O'zbekcha",
            Lang::Ru => "🇷🇺 Русский",
            Lang::En => "🇬🇧 English",
        }
    }
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uz" => Ok(Lang::Uz),
            "ru" => Ok(Lang::Ru),
            "en" => Ok(Lang::En),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Message keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    /// `/start` greeting, `{name}`
    StartWelcome,
    /// `/help`
    Help,
    /// Message without a link
    ErrorLink,
    /// Link from an unknown platform
    ErrorUnsupported,
    /// Failure without details
    ErrorUnknown,
    /// Heading of a failure message
    ErrorTitle,
    /// Kind picker prompt, `{emoji}` `{name}`
    WhatToDownload,
    /// Button
    BtnVideo,
    /// Button
    BtnAudio,
    /// Button
    BtnVideoNoWatermark,
    /// Button
    BtnImage,
    /// Button
    BtnCancel,
    /// Choice arrived after the pending link was gone
    LinkExpired,
    /// Pending choice discarded
    Cancelled,
    /// Status
    Preparing,
    /// Status
    CacheHit,
    /// Status
    Busy,
    /// Status
    Downloading,
    /// Status
    Uploading,
    /// Upload rejected for size
    FileTooLarge,
    /// Language picker prompt
    SelectLanguage,
    /// Language changed
    LanguageSelected,
    /// `/settings` body, `{quality}`
    Settings,
    /// Channel list prompt for users who have not joined
    SubscribeRequired,
    /// Button
    BtnSubscribed,
    /// Alert (plain text)
    NotSubscribed,
    /// Alert (plain text)
    SubscribeFirst,
    /// Alert (plain text)
    SubscriptionConfirmed,
}

/// Localised text for `key`
pub fn text(lang: Lang, key: Text) -> &'static str {
    match lang {
        Lang::Uz => uz(key),
        Lang::Ru => ru(key),
        Lang::En => en(key),
    }
}

fn uz(key: Text) -> &'static str {
    match key {
        Text::StartWelcome => "👋 Assalomu alaykum, *{name}*\\!\n\n\
            Menga video yoki musiqa havolasini yuboring, men uni yuklab beraman\\.",
        Text::Help => "ℹ️ *Yordam*\n\nHavolani yuboring va formatni tanlang\\.\n\
            Qo'llab\\-quvvatlanadigan platformalar: /platforms\n\
            Video sifati: /settings",
        Text::ErrorLink => "❌ Havola topilmadi\\. Iltimos, to'g'ri havola yuboring\\.",
        Text::ErrorUnsupported => "❌ Bu platforma qo'llab\\-quvvatlanmaydi\\.",
        Text::ErrorUnknown => "Noma'lum xatolik",
        Text::ErrorTitle => "❌ *Xatolik*",
        Text::WhatToDownload => "{emoji} *{name}*\n\nNimani yuklab olmoqchisiz?",
        Text::BtnVideo => "🎬 Video",
        Text::BtnAudio => "🎵 Audio",
        Text::BtnVideoNoWatermark => "🎬 Video (watermarksiz)",
        Text::BtnImage => "🖼 Rasm",
        Text::BtnCancel => "❌ Bekor qilish",
        Text::LinkExpired => "⌛ Havola eskirgan, qaytadan yuboring\\.",
        Text::Cancelled => "❌ Bekor qilindi\\.",
        Text::Preparing => "⏳ Tayyorlanmoqda\\.\\.\\.",
        Text::CacheHit => "✅ Fayl topildi, yuborilmoqda\\.\\.\\.",
        Text::Busy => "⏳ Server band, navbatingizni kuting\\.\\.\\.",
        Text::Downloading => "📥 Yuklanmoqda\\.\\.\\.",
        Text::Uploading => "📤 Yuborilmoqda\\.\\.\\.",
        Text::FileTooLarge => "Fayl hajmi Telegram limitidan katta \\(50MB/2GB\\)",
        Text::SelectLanguage => "🌐 Tilni tanlang:",
        Text::LanguageSelected => "✅ Til o'zgartirildi\\.",
        Text::Settings => "⚙️ *Sozlamalar*\n\n📹 Video: {quality}\n\nSifatni tanlang:",
        Text::SubscribeRequired => {
            "🚫 *Botdan foydalanish uchun quyidagi kanallarga obuna bo'ling:*"
        }
        Text::BtnSubscribed => "✅ Obuna bo'ldim",
        Text::NotSubscribed => "❌ Hali hammasiga obuna bo'lmadingiz",
        Text::SubscribeFirst => "Avval kanallarga obuna bo'ling",
        Text::SubscriptionConfirmed => "✅ Obuna tasdiqlandi, botdan foydalanishingiz mumkin",
    }
}

fn ru(key: Text) -> &'static str {
    match key {
        Text::StartWelcome => "👋 Здравствуйте, *{name}*\\!\n\n\
            Отправьте ссылку на видео или музыку, и я скачаю её\\.",
        Text::Help => "ℹ️ *Помощь*\n\nОтправьте ссылку и выберите формат\\.\n\
            Поддерживаемые платформы: /platforms\n\
            Качество видео: /settings",
        Text::ErrorLink => "❌ Ссылка не найдена\\. Отправьте корректную ссылку\\.",
        Text::ErrorUnsupported => "❌ Эта платформа не поддерживается\\.",
        Text::ErrorUnknown => "Неизвестная ошибка",
        Text::ErrorTitle => "❌ *Ошибка*",
        Text::WhatToDownload => "{emoji} *{name}*\n\nЧто скачать?",
        Text::BtnVideo => "🎬 Видео",
        Text::BtnAudio => "🎵 Аудио",
        Text::BtnVideoNoWatermark => "🎬 Видео (без водяного знака)",
        Text::BtnImage => "🖼 Изображение",
        Text::BtnCancel => "❌ Отмена",
        Text::LinkExpired => "⌛ Ссылка устарела, отправьте её снова\\.",
        Text::Cancelled => "❌ Отменено\\.",
        Text::Preparing => "⏳ Подготовка\\.\\.\\.",
        Text::CacheHit => "✅ Файл найден, отправляю\\.\\.\\.",
        Text::Busy => "⏳ Сервер занят, ожидайте своей очереди\\.\\.\\.",
        Text::Downloading => "📥 Загрузка\\.\\.\\.",
        Text::Uploading => "📤 Отправка\\.\\.\\.",
        Text::FileTooLarge => "Файл превышает лимит Telegram \\(50MB/2GB\\)",
        Text::SelectLanguage => "🌐 Выберите язык:",
        Text::LanguageSelected => "✅ Язык изменён\\.",
        Text::Settings => "⚙️ *Настройки*\n\n📹 Видео: {quality}\n\nВыберите качество:",
        Text::SubscribeRequired => "🚫 *Чтобы пользоваться ботом, подпишитесь на каналы:*",
        Text::BtnSubscribed => "✅ Я подписался",
        Text::NotSubscribed => "❌ Вы подписались не на все каналы",
        Text::SubscribeFirst => "Сначала подпишитесь на каналы",
        Text::SubscriptionConfirmed => "✅ Подписка подтверждена, можно пользоваться ботом",
    }
}

fn en(key: Text) -> &'static str {
    match key {
        Text::StartWelcome => "👋 Hello, *{name}*\\!\n\n\
            Send me a video or music link and I will download it\\.",
        Text::Help => "ℹ️ *Help*\n\nSend a link and pick a format\\.\n\
            Supported platforms: /platforms\n\
            Video quality: /settings",
        Text::ErrorLink => "❌ No link found\\. Please send a valid link\\.",
        Text::ErrorUnsupported => "❌ This platform is not supported\\.",
        Text::ErrorUnknown => "Unknown error",
        Text::ErrorTitle => "❌ *Error*",
        Text::WhatToDownload => "{emoji} *{name}*\n\nWhat would you like to download?",
        Text::BtnVideo => "🎬 Video",
        Text::BtnAudio => "🎵 Audio",
        Text::BtnVideoNoWatermark => "🎬 Video (no watermark)",
        Text::BtnImage => "🖼 Image",
        Text::BtnCancel => "❌ Cancel",
        Text::LinkExpired => "⌛ This link has expired, please send it again\\.",
        Text::Cancelled => "❌ Cancelled\\.",
        Text::Preparing => "⏳ Preparing\\.\\.\\.",
        Text::CacheHit => "✅ Found it, sending\\.\\.\\.",
        Text::Busy => "⏳ Server is busy, please wait for your turn\\.\\.\\.",
        Text::Downloading => "📥 Downloading\\.\\.\\.",
        Text::Uploading => "📤 Uploading\\.\\.\\.",
        Text::FileTooLarge => "File exceeds the Telegram limit \\(50MB/2GB\\)",
        Text::SelectLanguage => "🌐 Choose a language:",
        Text::LanguageSelected => "✅ Language updated\\.",
        Text::Settings => "⚙️ *Settings*\n\n📹 Video: {quality}\n\nPick a quality:",
        Text::SubscribeRequired => "🚫 *Join these channels to use the bot:*",
        Text::BtnSubscribed => "✅ I have joined",
        Text::NotSubscribed => "❌ You have not joined every channel yet",
        Text::SubscribeFirst => "Join the channels first",
        Text::SubscriptionConfirmed => "✅ Subscription confirmed, enjoy the bot",
    }
}
