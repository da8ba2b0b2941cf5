//! 订单号 Luhn 校验

/// 校验订单号是否满足 Luhn 校验和
///
/// 从右往左每隔一位翻倍，翻倍结果大于 9 时减 9，总和能被 10 整除即有效。
/// 空串或含非数字字符一律无效。
pub fn is_valid(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    let mut sum = 0u32;
    for (i, b) in number.bytes().rev().enumerate() {
        if !b.is_ascii_digit() {
            return false;
        }
        let mut digit = u32::from(b - b'0');
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }

    sum % 10 == 0
}
