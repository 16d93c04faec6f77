pub mod index;
pub mod search;

#[cfg(test)]
pub(crate) mod testing;
