use std::error::Error as StdError;
use std::result::Result as StdResult;
use std::str::FromStr;

// The value is split off at the last '=', so keys (e.g. file paths) may
// contain '=' themselves.
pub fn parse_key_val<T, U>(s: &str) -> StdResult<(T, U), Box<dyn StdError>>
where
    T: FromStr,
    T::Err: StdError + 'static,
    U: FromStr,
    U::Err: StdError + 'static,
{
    let err_func = || format!("malformed 'key=value' pair '{}'", s);
    let pos = s.rfind('=').ok_or_else(err_func)?;
    if pos == 0 {
        return Err(err_func().into());
    }
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}
