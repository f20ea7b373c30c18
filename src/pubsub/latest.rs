use parking_lot::RwLock;

/// Состояние кэша последнего снимка.
///
/// Пустота кэша хранится явно: опубликованный пустой снимок (например,
/// пустой список машин) отличается от «ещё ничего не публиковали».
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Latest<M> {
    #[default]
    Empty,
    Present(M),
}

/// Однослотовый кэш последнего опубликованного сообщения.
///
/// Защищён собственным `RwLock`, независимым от реестра подписчиков:
/// чтения (засев новых подписчиков) идут параллельно, запись только при
/// публикации.
#[derive(Debug)]
pub struct LatestCache<M> {
    slot: RwLock<Latest<M>>,
}

impl<M> Latest<M> {
    pub fn is_present(&self) -> bool {
        matches!(self, Latest::Present(_))
    }

    pub fn as_option(&self) -> Option<&M> {
        match self {
            Latest::Empty => None,
            Latest::Present(m) => Some(m),
        }
    }
}

impl<M: Clone> LatestCache<M> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Latest::Empty),
        }
    }

    /// Перезаписывает слот, возвращая предыдущее значение.
    pub fn store(
        &self,
        msg: M,
    ) -> Latest<M> {
        std::mem::replace(&mut *self.slot.write(), Latest::Present(msg))
    }

    /// Копия текущего значения; блокировка отпускается до возврата.
    pub fn load(&self) -> Latest<M> {
        self.slot.read().clone()
    }
}

impl<M: Clone> Default for LatestCache<M> {
    fn default() -> Self {
        Self::new()
    }
}
