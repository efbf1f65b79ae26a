//! Bytecode compiler and stack VM for user-supplied expressions.
//!
//! Text goes through `tokenize` → implicit multiplication → `Parser` → [`Expr`]
//! → [`Compiler`] → [`Bytecode`]. The VM is generic over [`Scalar`], so one
//! compiled program evaluates both on `f64` and on [`Dual`] numbers for
//! analytic derivatives.

use crate::autodiff::Dual;
use crate::expression::{
    Bindings, CompilationError, CompiledExpression, EvaluationFailure, ExpressionCompiler,
};
use num_traits::Float;
use std::cell::RefCell;
use std::fmt::Debug;

/// A type the VM can run on.
pub trait Scalar: Float + Debug + 'static {
    fn lift(value: f64) -> Self;
}

impl Scalar for f64 {
    fn lift(value: f64) -> Self {
        value
    }
}

impl Scalar for Dual {
    fn lift(value: f64) -> Self {
        Dual::constant(value)
    }
}

/// Single-argument functions known to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryFn {
    Sin,
    Cos,
    Tan,
    Sec,
    Csc,
    Cot,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Exp,
    Ln,
    Log10,
    Log2,
    Sqrt,
    Cbrt,
    Abs,
    Sign,
    Floor,
    Ceil,
    Round,
}

impl UnaryFn {
    fn lookup(name: &str) -> Option<Self> {
        let func = match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "sec" => Self::Sec,
            "csc" => Self::Csc,
            "cot" => Self::Cot,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "asinh" => Self::Asinh,
            "acosh" => Self::Acosh,
            "atanh" => Self::Atanh,
            "exp" => Self::Exp,
            "ln" | "log" => Self::Ln,
            "log10" => Self::Log10,
            "log2" => Self::Log2,
            "sqrt" => Self::Sqrt,
            "cbrt" => Self::Cbrt,
            "abs" => Self::Abs,
            "sign" => Self::Sign,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            _ => return None,
        };
        Some(func)
    }

    fn apply<T: Scalar>(self, a: T) -> T {
        match self {
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Sec => a.cos().recip(),
            Self::Csc => a.sin().recip(),
            Self::Cot => a.tan().recip(),
            Self::Asin => a.asin(),
            Self::Acos => a.acos(),
            Self::Atan => a.atan(),
            Self::Sinh => a.sinh(),
            Self::Cosh => a.cosh(),
            Self::Tanh => a.tanh(),
            Self::Asinh => a.asinh(),
            Self::Acosh => a.acosh(),
            Self::Atanh => a.atanh(),
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Log10 => a.log10(),
            Self::Log2 => a.log2(),
            Self::Sqrt => a.sqrt(),
            Self::Cbrt => a.cbrt(),
            Self::Abs => a.abs(),
            Self::Sign => {
                if a.is_zero() {
                    a
                } else {
                    a.signum()
                }
            }
            Self::Floor => a.floor(),
            Self::Ceil => a.ceil(),
            Self::Round => a.round(),
        }
    }
}

/// Two-argument functions known to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFn {
    Pow,
    Atan2,
    Min,
    Max,
    Mod,
    Hypot,
    Log,
}

impl BinaryFn {
    fn lookup(name: &str) -> Option<Self> {
        let func = match name {
            "pow" => Self::Pow,
            "atan2" => Self::Atan2,
            "min" => Self::Min,
            "max" => Self::Max,
            "mod" => Self::Mod,
            "hypot" => Self::Hypot,
            "log" => Self::Log,
            _ => return None,
        };
        Some(func)
    }

    fn apply<T: Scalar>(self, a: T, b: T) -> T {
        match self {
            Self::Pow => a.powf(b),
            Self::Atan2 => a.atan2(b),
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Mod => floored_mod(a, b),
            Self::Hypot => a.hypot(b),
            Self::Log => a.ln() / b.ln(),
        }
    }
}

/// Modulo with the sign of the divisor.
fn floored_mod<T: Scalar>(a: T, b: T) -> T {
    a - b * (a / b).floor()
}

/// OpCodes for the stack-based virtual machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant onto the stack.
    LoadConst(f64),
    /// Pushes the value of a free symbol (by index into `Bytecode::symbols`).
    LoadSymbol(usize),
    /// Pops (b, a), pushes a + b.
    Add,
    /// Pops (b, a), pushes a - b.
    Sub,
    /// Pops (b, a), pushes a * b.
    Mul,
    /// Pops (b, a), pushes a / b.
    Div,
    /// Pops (b, a), pushes a ^ b.
    Pow,
    /// Pops (b, a), pushes a mod b.
    Mod,
    /// Pops a, pushes -a.
    Neg,
    /// Pops a, pushes f(a).
    Call1(UnaryFn),
    /// Pops (b, a), pushes f(a, b).
    Call2(BinaryFn),
}

/// A compiled sequence of operations plus the free symbols it reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
    pub symbols: Vec<String>,
}

/// Stateless stack VM.
pub struct VM;

impl VM {
    /// Runs `bytecode` with `symbols[i]` holding the value of
    /// `bytecode.symbols[i]`.
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        symbols: &[T],
        stack: &mut Vec<T>,
    ) -> Result<T, EvaluationFailure> {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(T::lift(val)),
                OpCode::LoadSymbol(idx) => {
                    let value = symbols
                        .get(idx)
                        .copied()
                        .ok_or(EvaluationFailure::MalformedBytecode)?;
                    stack.push(value);
                }
                OpCode::Neg => {
                    let a = pop(stack)?;
                    stack.push(-a);
                }
                OpCode::Call1(func) => {
                    let a = pop(stack)?;
                    stack.push(func.apply(a));
                }
                binary => {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    let value = match binary {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        OpCode::Pow => a.powf(b),
                        OpCode::Mod => floored_mod(a, b),
                        OpCode::Call2(func) => func.apply(a, b),
                        _ => return Err(EvaluationFailure::MalformedBytecode),
                    };
                    stack.push(value);
                }
            }
        }

        let result = pop(stack)?;
        if stack.is_empty() {
            Ok(result)
        } else {
            Err(EvaluationFailure::MalformedBytecode)
        }
    }
}

fn pop<T>(stack: &mut Vec<T>) -> Result<T, EvaluationFailure> {
    stack.pop().ok_or(EvaluationFailure::MalformedBytecode)
}

// --- AST & Parser ---

/// Abstract syntax tree for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // + - * / ^ %
    Negate(Box<Expr>),
    Call(String, Vec<Expr>),
}

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, CompilationError> {
    let tokens = insert_implicit_multiplication(tokenize(input)?);
    if tokens.is_empty() {
        return Err(CompilationError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(CompilationError::UnexpectedToken(token.describe())),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Comma,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("'{n}'"),
            Token::Identifier(name) => format!("'{name}'"),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Caret => "'^'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::Comma => "','".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CompilationError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            // Exponent only when a digit follows, so `2e` stays `2 * e`.
            if matches!(chars.peek(), Some('e') | Some('E')) {
                let mut lookahead = chars.clone();
                lookahead.next();
                let mut exponent = String::from("e");
                if let Some(&sign) = lookahead.peek() {
                    if sign == '+' || sign == '-' {
                        exponent.push(sign);
                        lookahead.next();
                    }
                }
                if lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                    while let Some(&d) = lookahead.peek() {
                        if d.is_ascii_digit() {
                            exponent.push(d);
                            lookahead.next();
                        } else {
                            break;
                        }
                    }
                    num_str.push_str(&exponent);
                    chars = lookahead;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| CompilationError::MalformedNumber(num_str.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '%' => Token::Percent,
                ',' => Token::Comma,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => return Err(CompilationError::UnexpectedCharacter(other)),
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

/// Inserts `*` where multiplication is implied: `2x`, `2(x)`, `(a)(b)`, `x y`,
/// `3 sin(x)`. A name followed by `(` is always a call, so an unknown name
/// fails to compile instead of becoming a product.
fn insert_implicit_multiplication(tokens: Vec<Token>) -> Vec<Token> {
    let mut result = Vec::with_capacity(tokens.len());
    let mut it = tokens.into_iter().peekable();
    while let Some(current) = it.next() {
        let insert = match (&current, it.peek()) {
            (Token::Number(_) | Token::Identifier(_) | Token::RParen, Some(Token::Identifier(_)))
            | (Token::Number(_) | Token::RParen, Some(Token::LParen))
            | (Token::RParen, Some(Token::Number(_))) => true,
            _ => false,
        };
        result.push(current);
        if insert {
            result.push(Token::Star);
        }
    }
    result
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), CompilationError> {
        match self.consume() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(CompilationError::UnexpectedToken(token.describe())),
            None => Err(CompilationError::UnexpectedEnd),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, CompilationError> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<Expr, CompilationError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => '+',
                Some(Token::Minus) => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompilationError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => '*',
                Some(Token::Slash) => '/',
                Some(Token::Percent) => '%',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompilationError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                let operand = self.parse_unary()?;
                Ok(Expr::Negate(Box::new(operand)))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, CompilationError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            // Right-associative; the exponent may carry its own sign.
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, CompilationError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let args = self.parse_arguments()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(token) => Err(CompilationError::UnexpectedToken(token.describe())),
            None => Err(CompilationError::UnexpectedEnd),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, CompilationError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.consume();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.consume() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(token) => return Err(CompilationError::UnexpectedToken(token.describe())),
                None => return Err(CompilationError::UnexpectedEnd),
            }
        }
    }
}

// --- Compiler ---

fn named_constant(name: &str) -> Option<f64> {
    match name {
        "pi" | "PI" => Some(std::f64::consts::PI),
        "e" | "E" => Some(std::f64::consts::E),
        "tau" => Some(std::f64::consts::TAU),
        "phi" => Some(1.618_033_988_749_895),
        _ => None,
    }
}

/// Compiles an AST into [`Bytecode`], interning free symbols in order of first
/// appearance.
#[derive(Default)]
pub struct Compiler {
    symbols: Vec<String>,
}

impl Compiler {
    pub fn compile(mut self, expr: &Expr) -> Result<Bytecode, CompilationError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode {
            ops,
            symbols: self.symbols,
        })
    }

    fn symbol_index(&mut self, name: &str) -> usize {
        if let Some(idx) = self.symbols.iter().position(|s| s == name) {
            return idx;
        }
        self.symbols.push(name.to_string());
        self.symbols.len() - 1
    }

    fn compile_recursive(
        &mut self,
        expr: &Expr,
        ops: &mut Vec<OpCode>,
    ) -> Result<(), CompilationError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => match named_constant(name) {
                Some(value) => ops.push(OpCode::LoadConst(value)),
                None => {
                    let idx = self.symbol_index(name);
                    ops.push(OpCode::LoadSymbol(idx));
                }
            },
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                let code = match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    '%' => OpCode::Mod,
                    other => return Err(CompilationError::UnexpectedCharacter(*other)),
                };
                ops.push(code);
            }
            Expr::Negate(operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(name, args) => {
                for arg in args {
                    self.compile_recursive(arg, ops)?;
                }
                let code = match (args.len(), UnaryFn::lookup(name), BinaryFn::lookup(name)) {
                    (1, Some(func), _) => OpCode::Call1(func),
                    (2, _, Some(func)) => OpCode::Call2(func),
                    (_, None, None) => {
                        return Err(CompilationError::UnknownFunction(name.clone()));
                    }
                    (found, Some(_), Some(_)) => {
                        return Err(CompilationError::Arity {
                            name: name.clone(),
                            expected: "1 or 2",
                            found,
                        })
                    }
                    (found, Some(_), None) => {
                        return Err(CompilationError::Arity {
                            name: name.clone(),
                            expected: "1",
                            found,
                        })
                    }
                    (found, None, Some(_)) => {
                        return Err(CompilationError::Arity {
                            name: name.clone(),
                            expected: "2",
                            found,
                        })
                    }
                };
                ops.push(code);
            }
        }
        Ok(())
    }
}

// --- CompiledExpression implementation ---

/// Scratch buffers reused across evaluations of one formula.
#[derive(Debug, Default)]
struct Scratch {
    values: Vec<f64>,
    stack: Vec<f64>,
}

/// A compiled formula ready for repeated evaluation.
///
/// Not `Sync`: the VM stack is reused across calls through a `RefCell`.
#[derive(Debug)]
pub struct Formula {
    bytecode: Bytecode,
    scratch: RefCell<Scratch>,
}

impl Formula {
    pub fn new(bytecode: Bytecode) -> Self {
        Self {
            bytecode,
            scratch: RefCell::new(Scratch::default()),
        }
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    fn resolve(&self, bindings: &Bindings, out: &mut Vec<f64>) -> Result<(), EvaluationFailure> {
        out.clear();
        for name in &self.bytecode.symbols {
            let value = bindings
                .get(name)
                .ok_or_else(|| EvaluationFailure::UndefinedSymbol(name.clone()))?;
            out.push(value);
        }
        Ok(())
    }
}

impl CompiledExpression for Formula {
    fn evaluate(&self, bindings: &Bindings) -> Result<f64, EvaluationFailure> {
        let mut scratch = self.scratch.borrow_mut();
        let Scratch { values, stack } = &mut *scratch;
        self.resolve(bindings, values)?;
        VM::execute(&self.bytecode, values, stack)
    }

    fn derivative(&self, bindings: &Bindings, wrt: &str) -> Option<Result<f64, EvaluationFailure>> {
        let mut values = Vec::with_capacity(self.bytecode.symbols.len());
        if let Err(err) = self.resolve(bindings, &mut values) {
            return Some(Err(err));
        }
        let seeded: Vec<Dual> = self
            .bytecode
            .symbols
            .iter()
            .zip(values)
            .map(|(name, value)| {
                if name == wrt {
                    Dual::variable(value)
                } else {
                    Dual::constant(value)
                }
            })
            .collect();
        let mut stack = Vec::with_capacity(16);
        Some(VM::execute(&self.bytecode, &seeded, &mut stack).map(|d| d.eps))
    }
}

/// The in-tree [`ExpressionCompiler`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BytecodeCompiler;

impl ExpressionCompiler for BytecodeCompiler {
    type Output = Formula;

    fn compile(&self, text: &str) -> Result<Formula, CompilationError> {
        let parsed = parse(text)?;
        let bytecode = Compiler::default().compile(&parsed)?;
        Ok(Formula::new(bytecode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Scope;

    fn eval_at(text: &str, x: f64) -> Result<f64, EvaluationFailure> {
        let formula = BytecodeCompiler.compile(text).expect("expression should compile");
        let scope = Scope::new();
        let locals = [("x", x)];
        formula.evaluate(&Bindings::new(&scope, &locals))
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn respects_precedence_and_associativity() {
        assert_close(eval_at("1 + 2 * 3", 0.0).unwrap(), 7.0);
        assert_close(eval_at("2 ^ 3 ^ 2", 0.0).unwrap(), 512.0);
        assert_close(eval_at("-x^2", 3.0).unwrap(), -9.0);
        assert_close(eval_at("2^-1", 0.0).unwrap(), 0.5);
        assert_close(eval_at("(1 + 2) * 3", 0.0).unwrap(), 9.0);
        assert_close(eval_at("7 % 3", 0.0).unwrap(), 1.0);
        assert_close(eval_at("-7 % 3", 0.0).unwrap(), 2.0);
    }

    #[test]
    fn parses_scientific_notation_and_constants() {
        assert_close(eval_at("1.5e-3", 0.0).unwrap(), 1.5e-3);
        assert_close(eval_at("2e", 0.0).unwrap(), 2.0 * std::f64::consts::E);
        assert_close(eval_at("cos(pi)", 0.0).unwrap(), -1.0);
    }

    #[test]
    fn inserts_implicit_multiplication() {
        assert_close(eval_at("2x", 4.0).unwrap(), 8.0);
        assert_close(eval_at("3 sin(x)", 0.5).unwrap(), 3.0 * 0.5_f64.sin());
        assert_close(eval_at("(x + 1)(x - 1)", 3.0).unwrap(), 8.0);
        assert_close(eval_at("2(x)", 3.0).unwrap(), 6.0);
    }

    #[test]
    fn evaluates_multi_argument_functions() {
        assert_close(eval_at("max(x, 2)", 1.0).unwrap(), 2.0);
        assert_close(eval_at("log(8, 2)", 0.0).unwrap(), 3.0);
        assert_close(eval_at("log(e)", 0.0).unwrap(), 1.0);
        assert_close(eval_at("atan2(1, 1)", 0.0).unwrap(), std::f64::consts::FRAC_PI_4);
    }

    #[test]
    fn rejects_malformed_text() {
        assert_eq!(BytecodeCompiler.compile("").unwrap_err(), CompilationError::Empty);
        assert_eq!(
            BytecodeCompiler.compile("1 +").unwrap_err(),
            CompilationError::UnexpectedEnd
        );
        assert_eq!(
            BytecodeCompiler.compile("x $ 2").unwrap_err(),
            CompilationError::UnexpectedCharacter('$')
        );
        assert_eq!(
            BytecodeCompiler.compile("foo(x)").unwrap_err(),
            CompilationError::UnknownFunction("foo".to_string())
        );
        assert!(matches!(
            BytecodeCompiler.compile("sin(x, 2)").unwrap_err(),
            CompilationError::Arity { .. }
        ));
        assert!(matches!(
            BytecodeCompiler.compile("(x + 1").unwrap_err(),
            CompilationError::UnexpectedEnd
        ));
        assert!(matches!(
            BytecodeCompiler.compile("x)").unwrap_err(),
            CompilationError::UnexpectedToken(_)
        ));
    }

    #[test]
    fn misspelled_function_is_a_compile_error() {
        assert_eq!(
            BytecodeCompiler.compile("2 sinn(x)").unwrap_err(),
            CompilationError::UnknownFunction("sinn".to_string())
        );
        assert_eq!(
            BytecodeCompiler.compile("a(x + 1)").unwrap_err(),
            CompilationError::UnknownFunction("a".to_string())
        );
    }

    #[test]
    fn identifiers_are_ascii_only() {
        assert_eq!(
            BytecodeCompiler.compile("xé + 1").unwrap_err(),
            CompilationError::UnexpectedCharacter('é')
        );
        assert_eq!(
            BytecodeCompiler.compile("π").unwrap_err(),
            CompilationError::UnexpectedCharacter('π')
        );
        assert!(BytecodeCompiler.compile("x_1 + _y2").is_ok());
    }

    #[test]
    fn undefined_symbol_fails_at_evaluation() {
        let err = eval_at("x + a", 1.0).unwrap_err();
        assert_eq!(err, EvaluationFailure::UndefinedSymbol("a".to_string()));
    }

    #[test]
    fn scope_supplies_parameters() {
        let formula = BytecodeCompiler.compile("a * x + b").expect("compile");
        let mut scope = Scope::new();
        scope.insert("a".to_string(), 2.0);
        scope.insert("b".to_string(), -1.0);
        let locals = [("x", 3.0)];
        let value = formula.evaluate(&Bindings::new(&scope, &locals)).unwrap();
        assert_close(value, 5.0);
    }

    #[test]
    fn derivative_runs_the_same_bytecode_on_duals() {
        let formula = BytecodeCompiler.compile("x^3 + sin(x)").expect("compile");
        let scope = Scope::new();
        let locals = [("x", 2.0)];
        let bindings = Bindings::new(&scope, &locals);
        let slope = formula
            .derivative(&bindings, "x")
            .expect("analytic derivative available")
            .expect("derivative should evaluate");
        assert_close(slope, 12.0 + 2.0_f64.cos());
    }

    #[test]
    fn domain_errors_surface_as_non_finite_values() {
        assert!(eval_at("sqrt(x)", -1.0).unwrap().is_nan());
        assert!(eval_at("1 / x", 0.0).unwrap().is_infinite());
    }
}
