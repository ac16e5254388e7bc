use crate::Language;

/// User-facing strings the client renders. Every key has an English and a
/// Russian form; English is the fallback language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    AppName,
    Tagline,
    CreateDialog,
    EnterDialog,
    MyDialogs,
    ArchivedDialogs,
    NoArchivedDialogs,
    SavePassword,
    DialogCode,
    PasswordWarning,
    DownloadPassword,
    SavedIt,
    ExitDialog,
    ExitDialogConfirm,
    DeviceName,
    DeviceNamePlaceholder,
    LightTheme,
    DarkTheme,
    Files,
    NoFiles,
    Devices,
    YouAre,
    UploadSuccess,
    UploadFailed,
    SaveFailed,
    FileDeleted,
    DeleteFailed,
    CreateFailed,
    NoAccess,
    MessageSent,
    MessageFailed,
    DialogRenamed,
    DialogExited,
    DialogLeft,
    DialogRestored,
    DeviceNameUpdated,
    WrongPassword,
}

pub fn translate(language: Language, key: MessageKey) -> &'static str {
    match language {
        Language::En => english(key),
        Language::Ru => russian(key),
    }
}

/// Like [`translate`], substituting `{name}`-style placeholders. Missing
/// params are left verbatim in the output.
pub fn translate_with(
    language: Language,
    key: MessageKey,
    params: &[(&str, String)],
) -> String {
    let mut text = translate(language, key).to_owned();
    for (name, value) in params {
        text = text.replace(&format!("{{{name}}}"), value);
    }
    text
}

fn english(key: MessageKey) -> &'static str {
    match key {
        MessageKey::AppName => "AllBox",
        MessageKey::Tagline => "Share files and messages with a 4-digit code",
        MessageKey::CreateDialog => "Create Dialog",
        MessageKey::EnterDialog => "Enter Dialog",
        MessageKey::MyDialogs => "My Dialogs",
        MessageKey::ArchivedDialogs => "Archived Dialogs",
        MessageKey::NoArchivedDialogs => "No archived dialogs",
        MessageKey::SavePassword => "Save your password",
        MessageKey::DialogCode => "Dialog code",
        MessageKey::PasswordWarning => "This password is shown only once",
        MessageKey::DownloadPassword => "Download password",
        MessageKey::SavedIt => "I saved it",
        MessageKey::ExitDialog => "Exit to Archive",
        MessageKey::ExitDialogConfirm => {
            "Are you sure you want to exit? Dialog will be moved to archive."
        }
        MessageKey::DeviceName => "Device Name",
        MessageKey::DeviceNamePlaceholder => "Enter device name",
        MessageKey::LightTheme => "Light",
        MessageKey::DarkTheme => "Dark",
        MessageKey::Files => "Files",
        MessageKey::NoFiles => "No files yet",
        MessageKey::Devices => "devices",
        MessageKey::YouAre => "You are",
        MessageKey::UploadSuccess => "Uploaded {n} file(s)",
        MessageKey::UploadFailed => "Failed to upload {name}",
        MessageKey::SaveFailed => "Failed to save {name}",
        MessageKey::FileDeleted => "File deleted",
        MessageKey::DeleteFailed => "Failed to delete file",
        MessageKey::CreateFailed => "Failed to create dialog",
        MessageKey::NoAccess => "You do not have access to this dialog",
        MessageKey::MessageSent => "Message sent",
        MessageKey::MessageFailed => "Failed to send message",
        MessageKey::DialogRenamed => "Dialog renamed",
        MessageKey::DialogExited => "Dialog moved to archive",
        MessageKey::DialogLeft => "You left the dialog",
        MessageKey::DialogRestored => "Dialog restored",
        MessageKey::DeviceNameUpdated => "Device name updated",
        MessageKey::WrongPassword => "Wrong password",
    }
}

fn russian(key: MessageKey) -> &'static str {
    match key {
        MessageKey::AppName => "AllBox",
        MessageKey::Tagline => "Делитесь файлами и сообщениями по 4-значному коду",
        MessageKey::CreateDialog => "Создать диалог",
        MessageKey::EnterDialog => "Войти в диалог",
        MessageKey::MyDialogs => "Мои диалоги",
        MessageKey::ArchivedDialogs => "Архив диалогов",
        MessageKey::NoArchivedDialogs => "Нет архивных диалогов",
        MessageKey::SavePassword => "Сохраните пароль",
        MessageKey::DialogCode => "Код диалога",
        MessageKey::PasswordWarning => "Пароль показывается только один раз",
        MessageKey::DownloadPassword => "Скачать пароль",
        MessageKey::SavedIt => "Я сохранил",
        MessageKey::ExitDialog => "Выйти в архив",
        MessageKey::ExitDialogConfirm => {
            "Вы уверены, что хотите выйти? Диалог будет перемещён в архив."
        }
        MessageKey::DeviceName => "Имя устройства",
        MessageKey::DeviceNamePlaceholder => "Введите имя устройства",
        MessageKey::LightTheme => "Светлая",
        MessageKey::DarkTheme => "Тёмная",
        MessageKey::Files => "Файлы",
        MessageKey::NoFiles => "Пока нет файлов",
        MessageKey::Devices => "устройств",
        MessageKey::YouAre => "Вы",
        MessageKey::UploadSuccess => "Загружено файлов: {n}",
        MessageKey::UploadFailed => "Не удалось загрузить {name}",
        MessageKey::SaveFailed => "Не удалось сохранить {name}",
        MessageKey::FileDeleted => "Файл удалён",
        MessageKey::DeleteFailed => "Не удалось удалить файл",
        MessageKey::CreateFailed => "Не удалось создать диалог",
        MessageKey::NoAccess => "У вас нет доступа к этому диалогу",
        MessageKey::MessageSent => "Сообщение отправлено",
        MessageKey::MessageFailed => "Не удалось отправить сообщение",
        MessageKey::DialogRenamed => "Диалог переименован",
        MessageKey::DialogExited => "Диалог перемещён в архив",
        MessageKey::DialogLeft => "Вы покинули диалог",
        MessageKey::DialogRestored => "Диалог восстановлен",
        MessageKey::DeviceNameUpdated => "Имя устройства обновлено",
        MessageKey::WrongPassword => "Неверный пароль",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_has_both_translations() {
        let keys = [
            MessageKey::AppName,
            MessageKey::UploadSuccess,
            MessageKey::NoAccess,
            MessageKey::DialogExited,
            MessageKey::WrongPassword,
        ];
        for key in keys {
            assert!(!translate(Language::En, key).is_empty());
            assert!(!translate(Language::Ru, key).is_empty());
        }
    }

    #[test]
    fn placeholder_substitution() {
        let text = translate_with(
            Language::En,
            MessageKey::UploadFailed,
            &[("name", "photo.png".to_owned())],
        );
        assert_eq!(text, "Failed to upload photo.png");
    }

    #[test]
    fn missing_params_stay_verbatim() {
        let text = translate_with(Language::En, MessageKey::UploadSuccess, &[]);
        assert_eq!(text, "Uploaded {n} file(s)");
    }
}
