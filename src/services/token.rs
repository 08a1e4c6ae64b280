use rand::Rng;
use rand::distributions::Alphanumeric;

/// トークン長（固定60文字）
pub const TOKEN_LENGTH: usize = 60;

/// リカバリートークン生成器
///
/// 60文字の英数字トークンを生成する。thread_rng は CSPRNG であり、
/// 連番や時刻・アカウント情報由来の値は一切含まれない。
/// 生成器単体では一意性を保証しない。全体の一意性はエントロピーと
/// ストアのキー検索の組み合わせで成立する。
#[derive(Clone, Default)]
pub struct TokenGenerator;

impl TokenGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }
}
