use rand::Rng;

use crate::Language;

// Display-name pools for freshly created dialogs, one per language.
pub const DIALOG_NAMES_EN: &[&str] = &[
    "Share Freely",
    "Open Exchange",
    "Quick Share",
    "Easy Transfer",
    "Fast Link",
    "Seamless Flow",
    "Smooth Sync",
    "Team Space",
    "Group Hub",
    "Unity Box",
    "Safe Haven",
    "Trust Zone",
    "Secure Drop",
    "Private Path",
    "Hidden Gem",
    "Secret Vault",
    "Guard Box",
    "Shield Space",
    "Swift Send",
    "Rapid Route",
    "Flash Drive",
    "Instant Move",
    "Speed Link",
    "Quick Drop",
    "Fast Track",
    "Turbo Share",
    "Bridge Point",
    "Link Hub",
    "Connect Flow",
    "Bond Space",
    "Sync Point",
    "Join Force",
    "Unite Now",
    "Merge Path",
    "Free Flow",
    "Open Sky",
    "Clear Path",
    "Bright Link",
    "New Wave",
    "Fresh Start",
    "Bold Move",
    "Next Step",
];

pub const DIALOG_NAMES_RU: &[&str] = &[
    "Общий Путь",
    "Связь Друзей",
    "Быстрый Обмен",
    "Лёгкая Передача",
    "Простой Путь",
    "Плавный Поток",
    "Синхро Точка",
    "Командный Дух",
    "Групповой Хаб",
    "Единый Центр",
    "Тихая Гавань",
    "Зона Доверия",
    "Безопасный Сейф",
    "Тайный Путь",
    "Скрытое Сокровище",
    "Секретный Бокс",
    "Надёжный Щит",
    "Охранная Зона",
    "Быстрый Старт",
    "Молния Связь",
    "Мгновенный Путь",
    "Скоростной Канал",
    "Турбо Обмен",
    "Флеш Доставка",
    "Ракетный Путь",
    "Экспресс Линк",
    "Мост Связи",
    "Точка Встречи",
    "Поток Данных",
    "Узел Связи",
    "Синхронный Мир",
    "Сила Вместе",
    "Общий Импульс",
    "Путь Вперёд",
    "Свободный Поток",
    "Открытый Мир",
    "Ясный Путь",
    "Яркая Связь",
    "Новая Волна",
    "Чистый Старт",
    "Смелый Шаг",
    "Новый Горизонт",
];

pub fn name_pool(language: Language) -> &'static [&'static str] {
    match language {
        Language::En => DIALOG_NAMES_EN,
        Language::Ru => DIALOG_NAMES_RU,
    }
}

pub fn random_dialog_name(language: Language) -> &'static str {
    let pool = name_pool(language);
    pool[rand::rng().random_range(0..pool.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_are_same_size_and_nonempty() {
        assert_eq!(DIALOG_NAMES_EN.len(), DIALOG_NAMES_RU.len());
        assert!(!DIALOG_NAMES_EN.is_empty());
    }

    #[test]
    fn random_name_comes_from_the_requested_pool() {
        for _ in 0..32 {
            let en = random_dialog_name(Language::En);
            assert!(DIALOG_NAMES_EN.contains(&en));
            let ru = random_dialog_name(Language::Ru);
            assert!(DIALOG_NAMES_RU.contains(&ru));
        }
    }
}
