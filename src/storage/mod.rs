mod ring;

pub use self::ring::SeqRing;
