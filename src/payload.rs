//! Item boxing for the backends that transport machine words
//!
//! LCRQ, LPRQ and FAAArrayQueue store a word per cell and use `0` as the
//! empty sentinel. Each pushed item is boxed with at least 8-byte alignment,
//! so its address is never `0` and never odd; odd words are free for
//! in-flight markers (reservation tokens, the taken mark).

/// The empty-cell sentinel
pub(crate) const EMPTY: usize = 0;

#[repr(align(8))]
struct Boxed<T>(T);

/// Moves `item` to the heap and returns its address
#[inline]
pub(crate) fn into_word<T>(item: T) -> usize {
    let word = Box::into_raw(Box::new(Boxed(item))) as usize;
    debug_assert!(is_item(word));
    word
}

/// Takes back ownership of an item stored by [`into_word`]
///
/// # Safety
///
/// `word` must come from `into_word::<T>` and be consumed exactly once.
#[inline]
pub(crate) unsafe fn from_word<T>(word: usize) -> T {
    let boxed = Box::from_raw(word as *mut Boxed<T>);
    boxed.0
}

/// Drops an item stored by [`into_word`] without returning it
///
/// # Safety
///
/// Same as [`from_word`].
#[inline]
pub(crate) unsafe fn drop_word<T>(word: usize) {
    drop(Box::from_raw(word as *mut Boxed<T>));
}

/// True for words that address an item (non-null, even)
#[inline(always)]
pub(crate) const fn is_item(word: usize) -> bool {
    word != EMPTY && word & 1 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_even_and_non_null() {
        let small = into_word(7u8);
        let unit = into_word(());
        let text = into_word(String::from("payload"));
        for word in [small, unit, text] {
            assert!(is_item(word));
        }
        unsafe {
            assert_eq!(from_word::<u8>(small), 7);
            from_word::<()>(unit);
            assert_eq!(from_word::<String>(text), "payload");
        }
    }

    #[test]
    fn markers_are_not_items() {
        assert!(!is_item(EMPTY));
        assert!(!is_item(1));
        assert!(!is_item((5 << 1) | 1));
    }
}
