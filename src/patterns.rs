//! The read-only rule catalog shared by the classifier and the categorizer.
//!
//! Rules live in one ordered list. A rule in a flow tier decides the flow
//! type of a transaction (only the EXCLUDED and INTERNAL_TRANSFER tiers do
//! this) and also names its category; a category-tier rule only names a
//! category for transactions already classified into its flow. Within a
//! tier, the first matching rule wins.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::Result;
use crate::models::FlowType;
use crate::settings::Settings;

pub const UNCATEGORIZED: &str = "Uncategorized";
pub const MORTGAGE_PAYMENT: &str = "Mortgage Payment";
pub const MORTGAGE_PRINCIPAL: &str = "Mortgage Principal";
pub const MORTGAGE_INTEREST: &str = "Mortgage Interest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityTier {
    Flow(FlowType),
    Category,
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flow(flow) => write!(f, "{flow}"),
            Self::Category => f.write_str("category"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternRule {
    pub pattern: String,
    regex: Regex,
    /// Flow the rule assigns (flow tiers) or is scoped to (category tier).
    pub flow: FlowType,
    pub category: String,
    pub base_confidence: f64,
    pub tier: PriorityTier,
}

impl PatternRule {
    pub fn new(
        pattern: &str,
        flow: FlowType,
        category: &str,
        base_confidence: f64,
        tier: PriorityTier,
    ) -> Result<Self> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            flow,
            category: category.to_string(),
            base_confidence,
            tier,
        })
    }

    pub fn is_match(&self, description: &str) -> bool {
        self.regex.is_match(description)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Merchant {
    pub name: String,
    pub category: String,
    pub flow: FlowType,
}

/// A user rule from settings, upper-cased and ready to match.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomRuleEntry {
    pub needle: String,
    pub category: Option<String>,
    pub flow_type: Option<FlowType>,
    pub confidence: f64,
}

impl CustomRuleEntry {
    pub fn is_match(&self, upper_description: &str) -> bool {
        upper_description.contains(&self.needle)
    }
}

#[derive(Debug, Clone)]
pub struct PatternTable {
    rules: Vec<PatternRule>,
    merchants: Vec<Merchant>,
    aliases: Vec<(String, String)>,
    custom_rules: Vec<CustomRuleEntry>,
}

// ---------------------------------------------------------------------------
// Built-in catalog
// ---------------------------------------------------------------------------

struct RuleGroup {
    category: &'static str,
    confidence: f64,
    patterns: &'static [&'static str],
}

const fn group(
    category: &'static str,
    confidence: f64,
    patterns: &'static [&'static str],
) -> RuleGroup {
    RuleGroup {
        category,
        confidence,
        patterns,
    }
}

// Mortgage first so "MORTGAGE LOAN PAYMENT" is named as a mortgage payment.
const EXCLUDED_RULES: &[RuleGroup] = &[
    group(
        MORTGAGE_PAYMENT,
        0.95,
        &[r"MORTGAGE PAYMENT", r"PAYMENT.*TO MORTGAGE", r"MORTGAGE.*PMT"],
    ),
    group(
        "Credit Card Payment",
        0.95,
        &[
            r"CHASE CARD.*PAYMENT",
            r"CHASE CREDIT CRD",
            r"PAYMENT TO CHASE CARD",
            r"AMEX.*PAYMENT",
            r"AMERICAN EXPRESS.*PAYMENT",
            r"DISCOVER.*PAYMENT",
            r"CAPITAL ONE.*(PAYMENT|PMT)",
            r"CITI.*PAYMENT",
            r"BARCLAYS.*PAYMENT",
            r"CREDIT CARD PAYMENT",
        ],
    ),
    group(
        "Loan Payment",
        0.95,
        &[
            r"LOAN PAYMENT",
            r"AUTO LOAN",
            r"CAR LOAN",
            r"STUDENT LOAN",
            r"PERSONAL LOAN",
            r"NAVIENT",
            r"NELNET",
            r"SOFI.*LOAN",
        ],
    ),
];

// Scoped narrowly: a brokerage name alone must not shadow income such as
// "DIVIDEND SCHWAB".
const TRANSFER_RULES: &[RuleGroup] = &[
    group(
        "Savings Transfer",
        0.9,
        &[r"TRANSFER TO.*SAV", r"TRANSFER FROM.*SAV", r"SAVINGS TRANSFER"],
    ),
    group(
        "Investment Transfer",
        0.9,
        &[
            r"SCHWAB.*TRANSFER",
            r"TRANSFER.*SCHWAB",
            r"FIDELITY.*(TRANSFER|MONEYLINE)",
            r"VANGUARD.*(BUY|TRANSFER)",
            r"ROBINHOOD.*TRANSFER",
            r"BETTERMENT.*(DEPOSIT|TRANSFER)",
            r"WEALTHFRONT.*(DEPOSIT|TRANSFER)",
            r"E\*?TRADE.*TRANSFER",
            r"INTERACTIVE BROKERS.*TRANSFER",
        ],
    ),
    group(
        "Account Transfer",
        0.85,
        &[
            r"TRANSFER TO.*CHK",
            r"TRANSFER FROM.*CHK",
            r"ONLINE TRANSFER",
            r"WIRE TRANSFER (IN|OUT)",
            r"EXTERNAL TRANSFER",
            r"BOOK TRANSFER",
        ],
    ),
    group("Treasury Direct", 0.9, &[r"TREASURY ?DIRECT"]),
    group(
        "Personal Transfer",
        0.85,
        &[r"ZELLE PAYMENT TO", r"ZELLE PAYMENT FROM", r"VENMO.*CASHOUT"],
    ),
];

const INCOME_RULES: &[RuleGroup] = &[
    group(
        "Salary",
        0.9,
        &[
            r"DIRECT DEP",
            r"PAYROLL",
            r"ADP.*CREDIT",
            r"GUSTO",
            r"SALARY",
            r"EDI PYMNTS",
        ],
    ),
    group(
        "Government Benefits",
        0.9,
        &[r"TREAS.*310", r"UI BENEFIT", r"UNEMPLOYMENT"],
    ),
    group(
        "Tax Refund",
        0.9,
        &[r"IRS.*TREAS", r"TAX REF", r"STATE.*REFUND", r"TREASURY.*REFUND"],
    ),
    group(
        "Investment Income",
        0.9,
        &[
            r"DIVIDEND",
            r"INTEREST PAYMENT",
            r"INTEREST PAID",
            r"CAPITAL GAIN",
            r"COINBASE",
        ],
    ),
    group(
        "Freelance",
        0.8,
        &[r"ZELLE FROM", r"VENMO FROM", r"CASH APP.*FROM", r"RECEIVABLE"],
    ),
    group(
        "Deposits",
        0.8,
        &[
            r"REMOTE.*ONLINE.*DEPOSIT",
            r"CHECK.*DEPOSIT",
            r"ATM CASH DEPOSIT",
            r"DEPOSIT ID NUMBER",
        ],
    ),
    group(
        "Reimbursement",
        0.75,
        &[r"REIMB", r"REFUND", r"RETURN", r"FEE REVERSAL"],
    ),
    group("Gift", 0.75, &[r"GIFT"]),
];

// No look-around in the regex crate, so order carries the exceptions:
// "UBER EATS" is dining before "UBER" is transportation, "AMAZON PRIME" is a
// subscription before "AMAZON" is shopping.
const EXPENSE_RULES: &[RuleGroup] = &[
    group(
        "Housing",
        0.9,
        &[r"\bRENT\b", r"HOA FEE", r"PROPERTY TAX", r"HOME.*INSURANCE", r"PROPERTY MGMT"],
    ),
    group(
        "Utilities",
        0.9,
        &[
            r"ELECTRIC",
            r"GAS COMP",
            r"\bWATER\b",
            r"INTERNET",
            r"CABLE",
            r"TRASH",
            r"SEWER",
            r"UTILIT",
            r"COMCAST",
            r"XFINITY",
            r"VERIZON",
            r"PUGET SOUND ENER",
        ],
    ),
    group(
        "Banking Fees",
        0.9,
        &[r"ATM.*FEE", r"WIRE.*FEE", r"OVERDRAFT", r"SERVICE FEE"],
    ),
    group(
        "Insurance",
        0.9,
        &[
            r"INSURANCE",
            r"GEICO",
            r"STATE FARM",
            r"ALLSTATE",
            r"PROGRESSIVE",
            r"LIBERTY MUTUAL",
            r"LEMONADE",
        ],
    ),
    group(
        "Taxes",
        0.9,
        &[
            r"IRS.*USATAXPYMT",
            r"TAX PAYMENT",
            r"ESTIMATED TAX",
            r"FEDERAL TAX",
            r"STATE TAX",
            r"DEPT REVENUE",
        ],
    ),
    group(
        "Subscriptions",
        0.9,
        &[
            r"NETFLIX",
            r"SPOTIFY",
            r"AMAZON.*PRIME",
            r"APPLE\.COM.*BILL",
            r"YOUTUBE",
            r"HULU",
            r"DISNEY\+",
            r"\bHBO",
            r"ADOBE",
            r"MICROSOFT",
        ],
    ),
    group(
        "Healthcare",
        0.9,
        &[
            r"\bCVS\b",
            r"WALGREENS",
            r"RITE AID",
            r"PHARMACY",
            r"MEDICAL",
            r"DENTAL",
            r"DOCTOR",
            r"HOSPITAL",
            r"CLINIC",
            r"LABCORP",
        ],
    ),
    group(
        "Groceries",
        0.9,
        &[
            r"SAFEWAY",
            r"WHOLE FOODS",
            r"TRADER JOE",
            r"KROGER",
            r"WALMART.*GROCERY",
            r"TARGET.*GROCERY",
            r"COSTCO",
            r"SAMS CLUB",
            r"\bALDI\b",
            r"PUBLIX",
        ],
    ),
    group(
        "Dining",
        0.9,
        &[
            r"UBER.*EATS",
            r"DOORDASH",
            r"GRUBHUB",
            r"POSTMATES",
            r"STARBUCKS",
            r"MCDONALD",
            r"CHIPOTLE",
            r"\bSUBWAY\b",
        ],
    ),
    group(
        "Dining",
        0.75,
        &[r"RESTAURANT", r"COFFEE", r"\bCAFE\b", r"PIZZA"],
    ),
    group(
        "Transportation",
        0.9,
        &[
            r"\bUBER\b",
            r"\bLYFT\b",
            r"\bSHELL\b",
            r"CHEVRON",
            r"EXXON",
            r"\bBP\b",
            r"PARKING",
            r"\bTOLL",
            r"\bMETRO\b",
            r"TRANSIT",
        ],
    ),
    group(
        "Shopping",
        0.85,
        &[
            r"AMAZON",
            r"\bAMZN",
            r"\bTARGET\b",
            r"WALMART",
            r"BEST BUY",
            r"HOME DEPOT",
            r"LOWES",
            r"IKEA",
            r"MACYS",
            r"NORDSTROM",
        ],
    ),
    group(
        "Entertainment",
        0.85,
        &[
            r"MOVIE",
            r"THEAT(ER|RE)",
            r"CONCERT",
            r"TICKETMASTER",
            r"STUBHUB",
            r"\bSTEAM\b",
            r"PLAYSTATION",
            r"XBOX",
            r"NINTENDO",
        ],
    ),
    group(
        "Personal Care",
        0.85,
        &[r"HAIRCUT", r"SALON", r"\bSPA\b", r"BARBER", r"NAILS", r"MASSAGE"],
    ),
    group(
        "Fitness",
        0.85,
        &[r"\bGYM\b", r"FITNESS", r"CROSSFIT", r"YOGA", r"PILATES"],
    ),
    group(
        "Crypto Purchases",
        0.85,
        &[r"COINBASE.*(RTL|BUY)", r"CRYPTO.*PURCHASE"],
    ),
    group(
        "Education",
        0.85,
        &[r"TUITION", r"UDEMY", r"COURSERA", r"\bSCHOOL\b"],
    ),
    group(
        "Government Services",
        0.85,
        &[r"\bDMV\b", r"DEPARTMENT OF LICENSING", r"STATE DOL"],
    ),
    group(
        "Pets",
        0.85,
        &[r"PETCO", r"PETSMART", r"\bVET\b", r"VETERINARY"],
    ),
    group(
        "Cash Withdrawals",
        0.75,
        &[r"ATM WITHDRAWAL", r"WITHDRAWAL", r"CHECK #?\d{3,}"],
    ),
];

const MERCHANTS: &[(&str, &str)] = &[
    ("WHOLE FOODS", "Groceries"),
    ("TRADER JOES", "Groceries"),
    ("SAFEWAY", "Groceries"),
    ("KROGER", "Groceries"),
    ("COSTCO", "Groceries"),
    ("STARBUCKS", "Dining"),
    ("CHIPOTLE", "Dining"),
    ("MCDONALDS", "Dining"),
    ("UBER EATS", "Dining"),
    ("DOORDASH", "Dining"),
    ("AMAZON", "Shopping"),
    ("TARGET", "Shopping"),
    ("WALMART", "Shopping"),
    ("BEST BUY", "Shopping"),
    ("SHELL", "Transportation"),
    ("CHEVRON", "Transportation"),
    ("UBER", "Transportation"),
    ("LYFT", "Transportation"),
    ("NETFLIX", "Subscriptions"),
    ("SPOTIFY", "Subscriptions"),
    ("AMAZON PRIME", "Subscriptions"),
];

fn compile_groups(
    groups: &[RuleGroup],
    flow: FlowType,
    tier: PriorityTier,
    out: &mut Vec<PatternRule>,
) -> Result<()> {
    for g in groups {
        for pattern in g.patterns {
            out.push(PatternRule::new(pattern, flow, g.category, g.confidence, tier)?);
        }
    }
    Ok(())
}

impl PatternTable {
    /// The built-in catalog with no user rules or aliases.
    pub fn builtin() -> Result<Self> {
        let mut rules = Vec::new();
        compile_groups(
            EXCLUDED_RULES,
            FlowType::Excluded,
            PriorityTier::Flow(FlowType::Excluded),
            &mut rules,
        )?;
        compile_groups(
            TRANSFER_RULES,
            FlowType::InternalTransfer,
            PriorityTier::Flow(FlowType::InternalTransfer),
            &mut rules,
        )?;
        compile_groups(INCOME_RULES, FlowType::Income, PriorityTier::Category, &mut rules)?;
        compile_groups(EXPENSE_RULES, FlowType::Expense, PriorityTier::Category, &mut rules)?;

        let merchants = MERCHANTS
            .iter()
            .map(|(name, category)| Merchant {
                name: name.to_string(),
                category: category.to_string(),
                flow: FlowType::Expense,
            })
            .collect();

        Ok(Self::from_parts(rules, merchants))
    }

    /// Built-in catalog plus the custom rules and merchant aliases from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut table = Self::builtin()?;
        for (raw, canonical) in &settings.merchant_aliases {
            table.add_alias(raw, canonical);
        }
        table.custom_rules = settings
            .custom_rules
            .iter()
            .map(|r| CustomRuleEntry {
                needle: r.description_contains.trim().to_uppercase(),
                category: r.category.clone(),
                flow_type: r.flow_type,
                confidence: r.confidence.map(|c| c.clamp(0.0, 1.0)).unwrap_or(1.0),
            })
            .collect();
        Ok(table)
    }

    pub fn from_parts(rules: Vec<PatternRule>, merchants: Vec<Merchant>) -> Self {
        Self {
            rules,
            merchants,
            aliases: Vec::new(),
            custom_rules: Vec::new(),
        }
    }

    /// Register a literal rewrite. An alias pointing at a known merchant also
    /// becomes a merchant name for approximate matching.
    pub fn add_alias(&mut self, raw: &str, canonical: &str) {
        let raw = raw.trim().to_uppercase();
        let canonical = canonical.trim().to_uppercase();
        if let Some(known) = self.merchants.iter().find(|m| m.name == canonical).cloned() {
            if !self.merchants.iter().any(|m| m.name == raw) {
                self.merchants.push(Merchant {
                    name: raw.clone(),
                    ..known
                });
            }
        }
        self.aliases.push((raw, canonical));
        // Longest alias first so a short alias never rewrites part of a longer one.
        self.aliases
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn tier(&self, tier: PriorityTier) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter().filter(move |r| r.tier == tier)
    }

    /// Rules eligible to categorize a transaction of `flow`: flow-tier rules
    /// first, then category rules, each in catalog order.
    pub fn category_rules(&self, flow: FlowType) -> impl Iterator<Item = &PatternRule> {
        let flow_tier = self
            .rules
            .iter()
            .filter(move |r| r.flow == flow && r.tier == PriorityTier::Flow(flow));
        let category_tier = self
            .rules
            .iter()
            .filter(move |r| r.flow == flow && r.tier == PriorityTier::Category);
        flow_tier.chain(category_tier)
    }

    pub fn is_mortgage_payment(&self, description: &str) -> bool {
        let upper = description.to_uppercase();
        self.tier(PriorityTier::Flow(FlowType::Excluded))
            .any(|r| r.category == MORTGAGE_PAYMENT && r.is_match(&upper))
    }

    pub fn merchants(&self, flow: FlowType) -> impl Iterator<Item = &Merchant> {
        self.merchants.iter().filter(move |m| m.flow == flow)
    }

    pub fn aliases(&self) -> &[(String, String)] {
        &self.aliases
    }

    pub fn custom_rules(&self) -> &[CustomRuleEntry] {
        &self.custom_rules
    }

    /// Apply alias rewrites to an upper-cased description. Returns `None`
    /// when no alias occurs in the text.
    pub fn normalize(&self, upper_description: &str) -> Option<String> {
        let mut text = upper_description.to_string();
        let mut changed = false;
        for (raw, canonical) in &self.aliases {
            if text.contains(raw.as_str()) {
                text = text.replace(raw.as_str(), canonical);
                changed = true;
            }
        }
        changed.then_some(text)
    }
}
