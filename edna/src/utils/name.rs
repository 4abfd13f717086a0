use rand::distributions::Alphanumeric;
use rand::Rng;

/// A random alphanumeric suffix, used for nodes created without a name.
pub fn create_name_suffix(suffix_length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(suffix_length)
        .map(char::from)
        .collect()
}

/// `name-XXXXX`
pub fn attach_name_suffix(name: &str, suffix_length: usize) -> String {
    format!("{}-{}", name, create_name_suffix(suffix_length))
}
