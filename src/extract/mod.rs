pub mod assemble;
pub mod backends;
pub mod classify;
pub mod columns;
pub mod locate;
pub mod orchestrate;
pub mod parsers;
pub mod validate;

#[cfg(test)]
mod tests;
