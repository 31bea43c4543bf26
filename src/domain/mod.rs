pub mod credential;
pub mod illust;

pub use credential::Credential;
pub use illust::{Illust, IllustUser, ImageRef, PageLayout};
