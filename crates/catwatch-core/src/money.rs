//! Money and currency helpers.
//!
//! All stored amounts are integer minor units (cents). Conversion to major
//! units only happens at display boundaries.

/// Convert cents to dollars.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Convert dollars to cents, rounding to the nearest cent.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}

/// Format a cent amount as dollars with thousands separators, e.g. `1,234.56`.
#[must_use]
pub fn format_currency(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let whole = (abs / 100).to_string();
    let fraction = abs % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped}.{fraction:02}")
}

/// Currency code lookup.
pub struct Currency;

impl Currency {
    /// Return the full name for a lowercase ISO currency code.
    #[must_use]
    pub fn lookup(code: &str) -> Option<&'static str> {
        let code = code.to_ascii_lowercase();
        CURRENCIES
            .binary_search_by_key(&code.as_str(), |(c, _)| c)
            .ok()
            .map(|idx| CURRENCIES[idx].1)
    }

    /// Whether the code is a supported currency.
    #[must_use]
    pub fn is_supported(code: &str) -> bool {
        Self::lookup(code).is_some()
    }
}

/// Supported currencies, sorted by code.
const CURRENCIES: &[(&str, &str)] = &[
    ("aed", "United Arab Emirates Dirham"),
    ("afn", "Afghan Afghani"),
    ("all", "Albanian Lek"),
    ("amd", "Armenian Dram"),
    ("ang", "Netherlands Antillean Gulden"),
    ("aoa", "Angolan Kwanza"),
    ("ars", "Argentine Peso"),
    ("aud", "Australian Dollar"),
    ("awg", "Aruban Florin"),
    ("azn", "Azerbaijani Manat"),
    ("bam", "Bosnia & Herzegovina Convertible Mark"),
    ("bbd", "Barbadian Dollar"),
    ("bdt", "Bangladeshi Taka"),
    ("bgn", "Bulgarian Lev"),
    ("bif", "Burundian Franc"),
    ("bmd", "Bermudian Dollar"),
    ("bnd", "Brunei Dollar"),
    ("bob", "Bolivian Boliviano"),
    ("brl", "Brazilian Real"),
    ("bsd", "Bahamian Dollar"),
    ("bwp", "Botswana Pula"),
    ("bzd", "Belize Dollar"),
    ("cad", "Canadian Dollar"),
    ("cdf", "Congolese Franc"),
    ("chf", "Swiss Franc"),
    ("clp", "Chilean Peso"),
    ("cny", "Chinese Renminbi Yuan"),
    ("cop", "Colombian Peso"),
    ("crc", "Costa Rican Colón"),
    ("cve", "Cape Verdean Escudo"),
    ("czk", "Czech Koruna"),
    ("djf", "Djiboutian Franc"),
    ("dkk", "Danish Krone"),
    ("dop", "Dominican Peso"),
    ("dzd", "Algerian Dinar"),
    ("eek", "Estonian Kroon"),
    ("egp", "Egyptian Pound"),
    ("etb", "Ethiopian Birr"),
    ("eur", "Euro"),
    ("fjd", "Fijian Dollar"),
    ("fkp", "Falkland Islands Pound"),
    ("gbp", "British Pound"),
    ("gel", "Georgian Lari"),
    ("gip", "Gibraltar Pound"),
    ("gmd", "Gambian Dalasi"),
    ("gnf", "Guinean Franc"),
    ("gtq", "Guatemalan Quetzal"),
    ("gyd", "Guyanese Dollar"),
    ("hkd", "Hong Kong Dollar"),
    ("hnl", "Honduran Lempira"),
    ("hrk", "Croatian Kuna"),
    ("htg", "Haitian Gourde"),
    ("huf", "Hungarian Forint"),
    ("idr", "Indonesian Rupiah"),
    ("ils", "Israeli New Sheqel"),
    ("inr", "Indian Rupee"),
    ("isk", "Icelandic Króna"),
    ("jmd", "Jamaican Dollar"),
    ("jpy", "Japanese Yen"),
    ("kes", "Kenyan Shilling"),
    ("kgs", "Kyrgyzstani Som"),
    ("khr", "Cambodian Riel"),
    ("kmf", "Comorian Franc"),
    ("krw", "South Korean Won"),
    ("kyd", "Cayman Islands Dollar"),
    ("kzt", "Kazakhstani Tenge"),
    ("lak", "Lao Kip"),
    ("lbp", "Lebanese Pound"),
    ("lkr", "Sri Lankan Rupee"),
    ("lrd", "Liberian Dollar"),
    ("lsl", "Lesotho Loti"),
    ("ltl", "Lithuanian Litas"),
    ("lvl", "Latvian Lats"),
    ("mad", "Moroccan Dirham"),
    ("mdl", "Moldovan Leu"),
    ("mga", "Malagasy Ariary"),
    ("mkd", "Macedonian Denar"),
    ("mnt", "Mongolian Tögrög"),
    ("mop", "Macanese Pataca"),
    ("mro", "Mauritanian Ouguiya"),
    ("mur", "Mauritian Rupee"),
    ("mvr", "Maldivian Rufiyaa"),
    ("mwk", "Malawian Kwacha"),
    ("mxn", "Mexican Peso"),
    ("myr", "Malaysian Ringgit"),
    ("mzn", "Mozambican Metical"),
    ("nad", "Namibian Dollar"),
    ("ngn", "Nigerian Naira"),
    ("nio", "Nicaraguan Córdoba"),
    ("nok", "Norwegian Krone"),
    ("npr", "Nepalese Rupee"),
    ("nzd", "New Zealand Dollar"),
    ("pab", "Panamanian Balboa"),
    ("pen", "Peruvian Nuevo Sol"),
    ("pgk", "Papua New Guinean Kina"),
    ("php", "Philippine Peso"),
    ("pkr", "Pakistani Rupee"),
    ("pln", "Polish Złoty"),
    ("pyg", "Paraguayan Guaraní"),
    ("qar", "Qatari Riyal"),
    ("ron", "Romanian Leu"),
    ("rsd", "Serbian Dinar"),
    ("rub", "Russian Ruble"),
    ("rwf", "Rwandan Franc"),
    ("sar", "Saudi Riyal"),
    ("sbd", "Solomon Islands Dollar"),
    ("scr", "Seychellois Rupee"),
    ("sek", "Swedish Krona"),
    ("sgd", "Singapore Dollar"),
    ("shp", "Saint Helenian Pound"),
    ("sll", "Sierra Leonean Leone"),
    ("sos", "Somali Shilling"),
    ("srd", "Surinamese Dollar"),
    ("std", "São Tomé and Príncipe Dobra"),
    ("svc", "Salvadoran Colón"),
    ("szl", "Swazi Lilangeni"),
    ("thb", "Thai Baht"),
    ("tjs", "Tajikistani Somoni"),
    ("top", "Tongan Paʻanga"),
    ("try", "Turkish Lira"),
    ("ttd", "Trinidad and Tobago Dollar"),
    ("twd", "New Taiwan Dollar"),
    ("tzs", "Tanzanian Shilling"),
    ("uah", "Ukrainian Hryvnia"),
    ("ugx", "Ugandan Shilling"),
    ("usd", "United States Dollar"),
    ("uyu", "Uruguayan Peso"),
    ("uzs", "Uzbekistani Som"),
    ("vef", "Venezuelan Bolívar"),
    ("vnd", "Vietnamese Đồng"),
    ("vuv", "Vanuatu Vatu"),
    ("wst", "Samoan Tala"),
    ("xaf", "Central African Cfa Franc"),
    ("xcd", "East Caribbean Dollar"),
    ("xof", "West African Cfa Franc"),
    ("xpf", "Cfp Franc"),
    ("yer", "Yemeni Rial"),
    ("zar", "South African Rand"),
    ("zmw", "Zambian Kwacha"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_become_dollars() {
        assert!((cents_to_dollars(0) - 0.0).abs() < f64::EPSILON);
        assert!((cents_to_dollars(5) - 0.05).abs() < f64::EPSILON);
        assert!((cents_to_dollars(-20) + 0.2).abs() < f64::EPSILON);
        assert!((cents_to_dollars(100) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dollars_become_cents() {
        assert_eq!(dollars_to_cents(2.33), 233);
        assert_eq!(dollars_to_cents(-4.0), -400);
        assert_eq!(dollars_to_cents(1.0), 100);
        assert_eq!(dollars_to_cents(-0.0), 0);
    }

    #[test]
    fn conversion_round_trips_across_int_range() {
        for cents in [0_i64, 1, 99, 101, 12_345, 999_999, 2_147_483_647] {
            assert_eq!(dollars_to_cents(cents_to_dollars(cents)), cents);
        }
    }

    #[test]
    fn currency_is_formatted_with_separators() {
        assert_eq!(format_currency(0), "0.00");
        assert_eq!(format_currency(500), "5.00");
        assert_eq!(format_currency(123_456), "1,234.56");
        assert_eq!(format_currency(100_000_000), "1,000,000.00");
        assert_eq!(format_currency(-1_050), "-10.50");
    }

    #[test]
    fn currency_lookup() {
        assert_eq!(Currency::lookup("usd"), Some("United States Dollar"));
        assert_eq!(Currency::lookup("EUR"), Some("Euro"));
        assert_eq!(Currency::lookup("zzz"), None);
        assert!(CURRENCIES.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
